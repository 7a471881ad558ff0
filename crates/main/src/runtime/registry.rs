////////////////////////////////////////////////////////////////////////////////
// This file is part of "Deferred Call", a library of serializable,           //
// late-bound method invocations.                                             //
//                                                                            //
// This work is proprietary software with source-available code.              //
//                                                                            //
// To copy, use, distribute, or contribute to this work, you must agree to    //
// the terms of the General License Agreement:                                //
//                                                                            //
// https://github.com/Eliah-Lakhin/ad-astra/blob/master/EULA.md               //
//                                                                            //
// The agreement grants a Basic Commercial License, allowing you to use       //
// this work in non-commercial and limited commercial products with a total   //
// gross revenue cap. To remove this commercial limit for one of your         //
// products, you must acquire a Full Commercial License.                      //
//                                                                            //
// If you contribute to the source code, documentation, or related materials, //
// you must grant me an exclusive license to these contributions.             //
// Contributions are governed by the "Contributions" section of the General   //
// License Agreement.                                                         //
//                                                                            //
// Copying the work in parts is strictly forbidden, except as permitted       //
// under the General License Agreement.                                       //
//                                                                            //
// If you do not or cannot agree to the terms of this Agreement,              //
// do not use this work.                                                      //
//                                                                            //
// This work is provided "as is", without any warranties, express or implied, //
// except where such disclaimers are legally invalid.                         //
//                                                                            //
// Copyright (c) 2024 Ilya Lakhin (Илья Александрович Лахин).                 //
// All rights reserved.                                                       //
////////////////////////////////////////////////////////////////////////////////

use std::{
    fmt::{Debug, Formatter},
    ops::Deref,
    sync::{Arc, Mutex, RwLock},
    thread::{self, ThreadId},
};

use ahash::AHashMap;
use compact_str::CompactString;
use lady_deirdre::sync::Lazy;
use log::{debug, trace, warn};

use crate::runtime::{
    suggest::suggest,
    BoxedError,
    Callable,
    ModuleBuilder,
    RegistryConfig,
    RuntimeError,
    RuntimeResult,
};

pub(crate) static REGISTRY_LOG: &'static str = "deferred-call::$registry";
pub(crate) static RESOLVE_LOG: &'static str = "deferred-call::$resolve";

type Loader = dyn Fn(&mut ModuleBuilder) -> Result<(), BoxedError> + Send + Sync;

/// A registry of modules whose functions and methods can be referred to by
/// name.
///
/// The registry is the Rust counterpart of a module system: each module is
/// declared under its path (usually the string returned by `module_path!()`
/// in the declaring module) together with a loader function. The loader
/// populates the module's functions, owner types, and methods through the
/// [ModuleBuilder] the first time the module is needed.
///
/// ```
/// use deferred_call::runtime::{Registry, SymbolReference};
///
/// fn add(a: i64, b: i64) -> i64 {
///     a + b
/// }
///
/// let registry = Registry::new();
///
/// registry.module("arithmetic", |module| {
///     module.function("add", add).params(["a", "b"]);
///
///     Ok(())
/// });
///
/// let callable = registry.lookup("arithmetic", None, "add", None).unwrap();
///
/// assert_eq!(callable.to_string(), "fn add(a, b)");
/// ```
///
/// Module loading has at-most-once semantics: the loader of each module
/// runs until it succeeds once, and the loaded module is shared by all
/// subsequent lookups. A loader that fails leaves the module unloaded, so a
/// later lookup tries again.
///
/// The registry is thread-safe. Most programs use the process-wide
/// [global](Registry::global) registry, but independent registries can be
/// created for isolation.
pub struct Registry {
    config: RegistryConfig,
    modules: RwLock<AHashMap<CompactString, Arc<ModuleSlot>>>,
}

impl Debug for Registry {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Registry")
            .field("config", &self.config)
            .field("modules", &self.modules())
            .finish()
    }
}

impl Default for Registry {
    #[inline(always)]
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry with the default configuration.
    #[inline(always)]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::new())
    }

    /// Creates an empty registry with the specified configuration.
    #[inline(always)]
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            modules: RwLock::new(AHashMap::new()),
        }
    }

    /// Returns the process-wide registry.
    ///
    /// The global registry is created empty on first access, with the
    /// default configuration.
    #[inline(always)]
    pub fn global() -> &'static Self {
        static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

        GLOBAL.deref()
    }

    /// Returns the configuration of this registry.
    #[inline(always)]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Declares a module named `name`.
    ///
    /// The `loader` is not called immediately. It runs when the module is
    /// first [loaded](Self::load), and populates the module through the
    /// provided [ModuleBuilder]. If the loader returns an error, the load
    /// attempt fails with [RuntimeError::ModuleNotFound], and the next
    /// attempt calls the loader again.
    ///
    /// If a module with the same name has already been declared, the
    /// previous declaration is replaced, and its loaded state is discarded.
    /// References that have already resolved a callable from the previous
    /// declaration keep using it.
    ///
    /// The loader runs while the module is locked for loading, so other
    /// threads that need the same module wait for it. A loader that needs
    /// its own module, directly or through the loaders of other modules,
    /// gets [RuntimeError::ModuleNotFound] for it instead of blocking.
    pub fn module(
        &self,
        name: impl Into<CompactString>,
        loader: impl Fn(&mut ModuleBuilder) -> Result<(), BoxedError> + Send + Sync + 'static,
    ) {
        let name = name.into();

        let slot = Arc::new(ModuleSlot {
            name: name.clone(),
            loader: Box::new(loader),
            state: Mutex::new(None),
            loading: Mutex::new(None),
        });

        let mut modules = self
            .modules
            .write()
            .unwrap_or_else(|poison| poison.into_inner());

        match modules.insert(name.clone(), slot) {
            None => debug!(target: REGISTRY_LOG, "Module {name:?} declared."),
            Some(_) => warn!(target: REGISTRY_LOG, "Module {name:?} redeclared."),
        }
    }

    /// Removes the module declaration.
    ///
    /// Returns true if the module was declared.
    pub fn unload(&self, name: &str) -> bool {
        let mut modules = self
            .modules
            .write()
            .unwrap_or_else(|poison| poison.into_inner());

        let removed = modules.remove(name).is_some();

        if removed {
            debug!(target: REGISTRY_LOG, "Module {name:?} removed.");
        }

        removed
    }

    /// Returns true if a module named `name` is declared, regardless of
    /// whether it has been loaded.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.modules
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .contains_key(name)
    }

    /// Returns true if a module named `name` is declared and its loader has
    /// completed successfully.
    pub fn is_loaded(&self, name: &str) -> bool {
        let Some(slot) = self.slot(name) else {
            return false;
        };

        let state = slot
            .state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());

        state.is_some()
    }

    /// Returns the names of all declared modules in alphabetical order.
    pub fn modules(&self) -> Vec<CompactString> {
        let modules = self
            .modules
            .read()
            .unwrap_or_else(|poison| poison.into_inner());

        let mut names = modules.keys().cloned().collect::<Vec<_>>();

        names.sort();

        names
    }

    /// Loads the module named `name`, running its loader if the module has
    /// not been loaded yet.
    ///
    /// Returns [RuntimeError::ModuleNotFound] if the module is not declared
    /// or if its loader fails.
    pub fn load(&self, name: &str) -> RuntimeResult<Arc<Module>> {
        let Some(slot) = self.slot(name) else {
            let suggestion = {
                let modules = self
                    .modules
                    .read()
                    .unwrap_or_else(|poison| poison.into_inner());

                suggest(&self.config, name, modules.keys().map(CompactString::as_str))
            };

            return Err(RuntimeError::ModuleNotFound {
                module: CompactString::from(name),
                cause: None,
                suggestion,
            });
        };

        if slot.is_loading_here() {
            warn!(target: REGISTRY_LOG, "Module {name:?} is required by its own loader.");

            let cause = BoxedError::from(format!(
                "Module {name:?} is required by its own loader, directly or through \
                another module.",
            ));

            return Err(RuntimeError::ModuleNotFound {
                module: CompactString::from(name),
                cause: Some(Arc::from(cause)),
                suggestion: None,
            });
        }

        let mut state = slot
            .state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());

        if let Some(module) = state.as_ref() {
            return Ok(module.clone());
        }

        let _loading = LoadingGuard::enter(&slot);

        let mut builder = ModuleBuilder::new(slot.name.clone());

        if let Err(error) = (slot.loader)(&mut builder) {
            warn!(target: REGISTRY_LOG, "Module {name:?} failed to load. {error}");

            return Err(RuntimeError::ModuleNotFound {
                module: CompactString::from(name),
                cause: Some(Arc::from(error)),
                suggestion: None,
            });
        }

        let module = Arc::new(builder.finish());

        debug!(
            target: REGISTRY_LOG,
            "Module {name:?} loaded with {} member(s) and {} type(s).",
            module.members.len(),
            module.types.len(),
        );

        *state = Some(module.clone());

        Ok(module)
    }

    /// Looks up a callable by its identity, loading the module if needed.
    ///
    /// The lookup follows four steps:
    ///
    ///  1. Loads the `module` ([ModuleNotFound](RuntimeError::ModuleNotFound)
    ///     on failure).
    ///  2. If the `owner` is specified, looks up the owner type in the module
    ///     ([OwnerTypeNotFound](RuntimeError::OwnerTypeNotFound)), and then
    ///     the `member` in the type
    ///     ([MemberNotFound](RuntimeError::MemberNotFound)).
    ///  3. Otherwise, looks up the `member` in the module
    ///     ([MemberNotFound](RuntimeError::MemberNotFound)).
    ///  4. If the `attribute` is specified, looks up the attribute of the
    ///     found member ([AttributeNotFound](RuntimeError::AttributeNotFound)).
    ///     Otherwise, the member must have an entry point of its own.
    ///
    /// Callers usually resolve through a
    /// [SymbolReference](crate::runtime::SymbolReference), which memoizes
    /// the result of this function.
    pub fn lookup(
        &self,
        module: &str,
        owner: Option<&str>,
        member: &str,
        attribute: Option<&str>,
    ) -> RuntimeResult<Callable> {
        let loaded = self.load(module)?;

        let entry = match owner {
            Some(owner) => {
                let Some(owner_type) = loaded.types.get(owner) else {
                    return Err(RuntimeError::OwnerTypeNotFound {
                        module: CompactString::from(module),
                        owner: CompactString::from(owner),
                        suggestion: suggest(&self.config, owner, loaded.type_names()),
                    });
                };

                let Some(entry) = owner_type.members.get(member) else {
                    return Err(RuntimeError::MemberNotFound {
                        module: CompactString::from(module),
                        owner: Some(CompactString::from(owner)),
                        member: CompactString::from(member),
                        suggestion: suggest(&self.config, member, owner_type.member_names()),
                    });
                };

                entry
            }

            None => {
                let Some(entry) = loaded.members.get(member) else {
                    return Err(RuntimeError::MemberNotFound {
                        module: CompactString::from(module),
                        owner: None,
                        member: CompactString::from(member),
                        suggestion: suggest(&self.config, member, loaded.member_names()),
                    });
                };

                entry
            }
        };

        let callable = match attribute {
            Some(attribute) => entry.attributes.get(attribute).ok_or_else(|| {
                RuntimeError::AttributeNotFound {
                    module: CompactString::from(module),
                    owner: owner.map(CompactString::from),
                    member: CompactString::from(member),
                    attribute: CompactString::from(attribute),
                }
            })?,

            None => entry
                .callable
                .as_ref()
                .ok_or_else(|| RuntimeError::MemberNotFound {
                    module: CompactString::from(module),
                    owner: owner.map(CompactString::from),
                    member: CompactString::from(member),
                    suggestion: None,
                })?,
        };

        trace!(target: RESOLVE_LOG, "Found {callable} in module {module:?}.");

        Ok(callable.clone())
    }

    #[inline]
    fn slot(&self, name: &str) -> Option<Arc<ModuleSlot>> {
        self.modules
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(name)
            .cloned()
    }
}

struct ModuleSlot {
    name: CompactString,
    loader: Box<Loader>,
    state: Mutex<Option<Arc<Module>>>,
    loading: Mutex<Option<ThreadId>>,
}

impl ModuleSlot {
    #[inline]
    fn is_loading_here(&self) -> bool {
        let loading = self
            .loading
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());

        *loading == Some(thread::current().id())
    }
}

// Marks the slot as being loaded by the current thread until dropped,
// including on loader panics.
struct LoadingGuard<'a> {
    slot: &'a ModuleSlot,
}

impl<'a> LoadingGuard<'a> {
    #[inline]
    fn enter(slot: &'a ModuleSlot) -> Self {
        *slot
            .loading
            .lock()
            .unwrap_or_else(|poison| poison.into_inner()) = Some(thread::current().id());

        Self { slot }
    }
}

impl<'a> Drop for LoadingGuard<'a> {
    #[inline]
    fn drop(&mut self) {
        *self
            .slot
            .loading
            .lock()
            .unwrap_or_else(|poison| poison.into_inner()) = None;
    }
}

/// A loaded module of the [Registry].
///
/// The module is created by the registry from the declarations of its
/// loader, and is immutable afterward.
pub struct Module {
    pub(super) name: CompactString,
    pub(super) members: AHashMap<CompactString, Entry>,
    pub(super) types: AHashMap<CompactString, OwnerType>,
}

impl Debug for Module {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Module")
            .field("name", &self.name)
            .field("members", &sorted(self.member_names()))
            .field("types", &sorted(self.type_names()))
            .finish()
    }
}

impl Module {
    /// Returns the module's name.
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the module-level member named `name`.
    #[inline(always)]
    pub fn member(&self, name: &str) -> Option<&Entry> {
        self.members.get(name)
    }

    /// Returns the owner type named `name`.
    #[inline(always)]
    pub fn owner(&self, name: &str) -> Option<&OwnerType> {
        self.types.get(name)
    }

    /// Returns an iterator over the names of module-level members in
    /// unspecified order.
    #[inline(always)]
    pub fn member_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.members.keys().map(CompactString::as_str)
    }

    /// Returns an iterator over the names of owner types in unspecified
    /// order.
    #[inline(always)]
    pub fn type_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.types.keys().map(CompactString::as_str)
    }
}

/// A type declared in a [Module] that owns methods and class-level
/// functions.
pub struct OwnerType {
    pub(super) name: CompactString,
    pub(super) members: AHashMap<CompactString, Entry>,
}

impl Debug for OwnerType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("OwnerType")
            .field("name", &self.name)
            .field("members", &sorted(self.member_names()))
            .finish()
    }
}

impl OwnerType {
    /// Returns the type's name.
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the member named `name`.
    #[inline(always)]
    pub fn member(&self, name: &str) -> Option<&Entry> {
        self.members.get(name)
    }

    /// Returns an iterator over the names of the type's members in
    /// unspecified order.
    #[inline(always)]
    pub fn member_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.members.keys().map(CompactString::as_str)
    }
}

/// A named member of a [Module] or an [OwnerType].
///
/// A member has an optional entry point of its own and a set of attributes,
/// each of which is a callable one level below the member. A member without
/// an entry point is a container that can only be called through its
/// attributes.
#[derive(Default)]
pub struct Entry {
    pub(super) callable: Option<Callable>,
    pub(super) attributes: AHashMap<CompactString, Callable>,
}

impl Debug for Entry {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        let attributes = sorted(self.attributes.keys().map(CompactString::as_str));

        formatter
            .debug_struct("Entry")
            .field("callable", &self.callable)
            .field("attributes", &attributes)
            .finish()
    }
}

impl Entry {
    /// Returns the member's own entry point, or None if the member is a
    /// container.
    #[inline(always)]
    pub fn callable(&self) -> Option<&Callable> {
        self.callable.as_ref()
    }

    /// Returns the attribute named `name`.
    #[inline(always)]
    pub fn attribute(&self, name: &str) -> Option<&Callable> {
        self.attributes.get(name)
    }
}

#[inline(always)]
fn sorted<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut names = names.collect::<Vec<_>>();

    names.sort_unstable();

    names
}

#[cfg(test)]
mod tests {
    use std::{
        fmt::{Display, Formatter},
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use crate::runtime::{Callable, Registry, RegistryConfig, RuntimeError};

    #[derive(Debug)]
    struct Unavailable;

    impl Display for Unavailable {
        fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("unavailable")
        }
    }

    impl std::error::Error for Unavailable {}

    fn negate(value: i64) -> i64 {
        -value
    }

    fn registry() -> Registry {
        let registry = Registry::new();

        registry.module("numbers", |module| {
            module.function("negate", negate);
            module.container("wrapped").attribute("inner", Callable::function("negate", negate));
            module.owner("Counter").function("zero", || 0);

            Ok(())
        });

        registry
    }

    #[test]
    fn test_lookup_steps() {
        let registry = registry();

        assert!(registry.lookup("numbers", None, "negate", None).is_ok());
        assert!(registry.lookup("numbers", None, "wrapped", Some("inner")).is_ok());
        assert!(registry.lookup("numbers", Some("Counter"), "zero", None).is_ok());

        assert!(matches!(
            registry.lookup("numbrs", None, "negate", None),
            Err(RuntimeError::ModuleNotFound { suggestion: Some(name), .. }) if name == "numbers",
        ));

        assert!(matches!(
            registry.lookup("numbers", Some("Countr"), "zero", None),
            Err(RuntimeError::OwnerTypeNotFound { suggestion: Some(name), .. }) if name == "Counter",
        ));

        assert!(matches!(
            registry.lookup("numbers", Some("Counter"), "one", None),
            Err(RuntimeError::MemberNotFound { owner: Some(_), .. }),
        ));

        assert!(matches!(
            registry.lookup("numbers", None, "negat", None),
            Err(RuntimeError::MemberNotFound { suggestion: Some(name), .. }) if name == "negate",
        ));

        assert!(matches!(
            registry.lookup("numbers", None, "negate", Some("inner")),
            Err(RuntimeError::AttributeNotFound { .. }),
        ));

        assert!(matches!(
            registry.lookup("numbers", None, "wrapped", None),
            Err(RuntimeError::MemberNotFound { suggestion: None, .. }),
        ));
    }

    #[test]
    fn test_quiet_registry() {
        let registry = Registry::with_config(RegistryConfig::quiet());

        registry.module("numbers", |_| Ok(()));

        assert!(matches!(
            registry.load("numbrs"),
            Err(RuntimeError::ModuleNotFound { suggestion: None, .. }),
        ));
    }

    #[test]
    fn test_load_once() {
        let registry = Registry::new();
        let loads = Arc::new(AtomicUsize::new(0));

        registry.module("counted", {
            let loads = loads.clone();

            move |module| {
                let _ = loads.fetch_add(1, Ordering::SeqCst);
                module.function("negate", negate);

                Ok(())
            }
        });

        assert!(registry.contains("counted"));
        assert!(!registry.is_loaded("counted"));

        for _ in 0..3 {
            let _ = registry.load("counted").unwrap();
        }

        assert!(registry.is_loaded("counted"));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_load_retries() {
        let registry = Registry::new();
        let ready = Arc::new(AtomicBool::new(false));

        registry.module("flaky", {
            let ready = ready.clone();

            move |module| {
                if !ready.load(Ordering::SeqCst) {
                    return Err(Box::new(Unavailable));
                }

                module.function("negate", negate);

                Ok(())
            }
        });

        let error = registry.load("flaky").unwrap_err();

        assert!(matches!(error, RuntimeError::ModuleNotFound { cause: Some(_), .. }));
        assert_eq!(error.to_string(), "Module \"flaky\" failed to load. unavailable");
        assert!(!registry.is_loaded("flaky"));

        ready.store(true, Ordering::SeqCst);

        assert!(registry.lookup("flaky", None, "negate", None).is_ok());
    }

    #[test]
    fn test_redeclare_and_unload() {
        let registry = registry();

        let _ = registry.load("numbers").unwrap();

        registry.module("numbers", |_| Ok(()));

        assert!(!registry.is_loaded("numbers"));
        assert!(registry.lookup("numbers", None, "negate", None).is_err());

        registry.module("letters", |_| Ok(()));

        assert_eq!(registry.modules(), ["letters", "numbers"]);
        assert!(registry.unload("numbers"));
        assert!(!registry.unload("numbers"));
        assert_eq!(registry.modules(), ["letters"]);
    }

    #[test]
    #[should_panic]
    fn test_duplicate_member_panics() {
        let registry = Registry::new();

        registry.module("twice", |module| {
            module.function("negate", negate);
            module.function("negate", negate);

            Ok(())
        });

        let _ = registry.load("twice");
    }

    #[test]
    fn test_concurrent_load_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new();

        registry.module("shared", {
            let loads = loads.clone();

            move |module| {
                let _ = loads.fetch_add(1, Ordering::SeqCst);

                thread::sleep(Duration::from_millis(20));

                module.function("negate", negate);

                Ok(())
            }
        });

        thread::scope(|scope| {
            for _ in 0..8 {
                let _ = scope.spawn(|| {
                    let callable = registry.lookup("shared", None, "negate", None).unwrap();

                    assert_eq!(callable.name(), "negate");
                });
            }
        });

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(registry.is_loaded("shared"));
    }

    #[test]
    fn test_self_dependent_loader() {
        let registry = Registry::global();

        registry.module("registry_tests_cycle_a", |module| {
            let _ = Registry::global().lookup("registry_tests_cycle_b", None, "negate", None)?;

            module.function("negate", negate);

            Ok(())
        });

        registry.module("registry_tests_cycle_b", |module| {
            let _ = Registry::global().lookup("registry_tests_cycle_a", None, "negate", None)?;

            module.function("negate", negate);

            Ok(())
        });

        let Err(RuntimeError::ModuleNotFound { module, cause, .. }) =
            registry.lookup("registry_tests_cycle_a", None, "negate", None)
        else {
            panic!("Cyclic module load should fail.");
        };

        assert_eq!(module, "registry_tests_cycle_a");

        let cause = cause.unwrap();
        let inner = cause.downcast_ref::<RuntimeError>().unwrap();

        assert!(matches!(
            inner,
            RuntimeError::ModuleNotFound { module, .. } if *module == "registry_tests_cycle_b",
        ));
        assert!(!registry.is_loaded("registry_tests_cycle_a"));
        assert!(!registry.is_loaded("registry_tests_cycle_b"));
    }
}
