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
    cell::OnceCell,
    fmt::{Debug, Display, Formatter},
};

use compact_str::CompactString;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::runtime::{
    registry::RESOLVE_LOG,
    Callable,
    Keywords,
    Registry,
    RuntimeError,
    RuntimeResult,
    Snapshot,
    SymbolPath,
};

/// Describes how a [SymbolReference] is bound to its target.
#[derive(Clone, PartialEq, Debug)]
pub enum Binding {
    /// The target is a free function of the module.
    Free,

    /// The target is a member of an owner type.
    Method {
        /// The name of the owner type within the module.
        owner: CompactString,

        /// The captured receiver passed to the target on each call. A
        /// [null](Snapshot::null) receiver denotes a class-level call.
        receiver: Snapshot,
    },
}

impl Binding {
    /// Returns the owner type name, if any.
    #[inline(always)]
    pub fn owner(&self) -> Option<&str> {
        match self {
            Self::Free => None,
            Self::Method { owner, .. } => Some(owner),
        }
    }

    /// Returns the captured receiver, if any.
    #[inline(always)]
    pub fn receiver(&self) -> Option<&Snapshot> {
        match self {
            Self::Free => None,
            Self::Method { receiver, .. } => Some(receiver),
        }
    }
}

/// A named, serializable reference to a function or method that resolves to
/// the actual [Callable] only when first needed.
///
/// The reference consists of the identity fields (the module, the optional
/// owner type, the member name, and the optional attribute) and, for
/// methods, a captured receiver [Snapshot]. The resolved Callable is
/// memoized inside the reference, but it is not part of the reference's
/// serialized form and is not considered by the [PartialEq]
/// implementation. After deserialization, the reference starts unresolved,
/// and resolves again in the current process.
///
/// A reference can be created from a live function item:
///
/// ```
/// use deferred_call::runtime::{Keywords, Registry, Snapshot, SymbolReference};
///
/// fn add(a: i64, b: i64) -> i64 {
///     a + b
/// }
///
/// let reference = SymbolReference::from_fn(add).unwrap();
///
/// let registry = Registry::new();
///
/// // Declares the module under the path the reference points to.
/// let module = reference.module().to_string();
/// registry.module(module, |module| {
///     module.function("add", add);
///     Ok(())
/// });
///
/// let arguments = [Snapshot::capture(&1).unwrap(), Snapshot::capture(&3).unwrap()];
///
/// let result = reference
///     .run_in(&registry, &arguments, &Keywords::new())
///     .unwrap();
///
/// assert_eq!(result.restore::<i64>().unwrap(), 4);
/// ```
///
/// In real programs, modules are usually declared in their own source
/// files with `module_path!()` as the module name, which is the same path
/// that [SymbolReference::from_fn] extracts.
///
/// The memoization is not synchronized: the reference is [Send] but not
/// [Sync], so sharing a single reference across threads requires external
/// synchronization.
///
/// The [Display] implementation prints the reference's path:
/// `module::Owner::member.attribute`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "SymbolRecord", into = "SymbolRecord")]
pub struct SymbolReference {
    module: CompactString,
    binding: Binding,
    member: CompactString,
    attribute: Option<CompactString>,
    resolved: OnceCell<Callable>,
}

impl PartialEq for SymbolReference {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.module == other.module
            && self.binding == other.binding
            && self.member == other.member
            && self.attribute == other.attribute
    }
}

impl Debug for SymbolReference {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SymbolReference")
            .field("module", &self.module)
            .field("binding", &self.binding)
            .field("member", &self.member)
            .field("attribute", &self.attribute)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl Display for SymbolReference {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.module)?;

        if let Some(owner) = self.binding.owner() {
            formatter.write_fmt(format_args!("::{owner}"))?;
        }

        formatter.write_fmt(format_args!("::{}", self.member))?;

        if let Some(attribute) = &self.attribute {
            formatter.write_fmt(format_args!(".{attribute}"))?;
        }

        Ok(())
    }
}

impl From<SymbolPath> for SymbolReference {
    fn from(path: SymbolPath) -> Self {
        let (module, owner, member) = path.into_parts();

        let binding = match owner {
            None => Binding::Free,
            Some(owner) => Binding::Method {
                owner,
                receiver: Snapshot::null(),
            },
        };

        Self::from_parts(module, binding, member, None)
    }
}

impl SymbolReference {
    /// Creates a reference to the free function `member` of the `module`.
    #[inline(always)]
    pub fn new(module: impl Into<CompactString>, member: impl Into<CompactString>) -> Self {
        Self::from_parts(module.into(), Binding::Free, member.into(), None)
    }

    /// Creates a reference to the `member` of the `owner` type declared in
    /// the `module`.
    ///
    /// The reference initially has a [null](Snapshot::null) receiver, which
    /// is appropriate for class-level functions. For methods that need a
    /// receiver, supply it with [bind_receiver](Self::bind_receiver) or
    /// [with_receiver](Self::with_receiver).
    #[inline(always)]
    pub fn method(
        module: impl Into<CompactString>,
        owner: impl Into<CompactString>,
        member: impl Into<CompactString>,
    ) -> Self {
        let binding = Binding::Method {
            owner: owner.into(),
            receiver: Snapshot::null(),
        };

        Self::from_parts(module.into(), binding, member.into(), None)
    }

    /// Creates a reference to a live free function item.
    ///
    /// The module and the member name are extracted from the function's
    /// path (see [SymbolPath::of_fn]). Closures, function pointers, and
    /// generic instantiations have no stable name, and the function returns
    /// [RuntimeError::Anonymous](crate::runtime::RuntimeError::Anonymous)
    /// for them.
    #[inline]
    pub fn from_fn<F>(function: F) -> RuntimeResult<Self> {
        Ok(Self::from(SymbolPath::of_fn(function)?))
    }

    /// Creates a reference to a live method bound to the `receiver`.
    ///
    /// The module, the owner type, and the member name are extracted from the
    /// paths of `S` and the `method` (see [SymbolPath::of_method]). The
    /// receiver is captured as a [Snapshot] immediately, so later changes
    /// of the receiver do not affect the reference.
    ///
    /// ```
    /// use deferred_call::runtime::SymbolReference;
    /// use serde::{Deserialize, Serialize};
    ///
    /// #[derive(Serialize, Deserialize)]
    /// struct Counter {
    ///     value: u32,
    /// }
    ///
    /// impl Counter {
    ///     fn get(&self) -> u32 {
    ///         self.value
    ///     }
    /// }
    ///
    /// let mut counter = Counter { value: 1 };
    ///
    /// let reference = SymbolReference::from_method(&counter, Counter::get).unwrap();
    ///
    /// counter.value = 2;
    ///
    /// assert_eq!(reference.owner(), Some("Counter"));
    /// assert_eq!(reference.member(), "get");
    /// assert_eq!(
    ///     reference.receiver().unwrap().restore::<Counter>().unwrap().value,
    ///     1,
    /// );
    /// ```
    pub fn from_method<S, F>(receiver: &S, method: F) -> RuntimeResult<Self>
    where
        S: Serialize + ?Sized,
    {
        let path = SymbolPath::of_method::<S, F>(method)?;
        let receiver = Snapshot::capture(receiver)?;

        Ok(Self::from(path).with_receiver(receiver))
    }

    /// Adds the attribute hop: after resolving the member, the reference
    /// resolves to the member's `attribute`.
    #[inline]
    pub fn with_attribute(mut self, attribute: impl Into<CompactString>) -> Self {
        self.attribute = Some(attribute.into());
        self.resolved = OnceCell::new();

        self
    }

    /// Replaces the captured receiver.
    ///
    /// If the reference has no owner type, the receiver is discarded and a
    /// warning is logged. Use [bind_receiver](Self::bind_receiver) to get an
    /// error instead.
    pub fn with_receiver(mut self, receiver: Snapshot) -> Self {
        if let Binding::Method { receiver: slot, .. } = &mut self.binding {
            *slot = receiver;

            return self;
        }

        warn!(
            target: RESOLVE_LOG,
            "Receiver {receiver} discarded: {self} has no owner type.",
        );

        self
    }

    /// Captures the `receiver` and makes it the reference's receiver.
    ///
    /// Returns [RuntimeError::UnexpectedReceiver] if the reference has no
    /// owner type. In this case, the reference stays unchanged.
    pub fn bind_receiver<S: Serialize + ?Sized>(&mut self, receiver: &S) -> RuntimeResult<()> {
        let Binding::Method { receiver: slot, .. } = &mut self.binding else {
            return Err(RuntimeError::UnexpectedReceiver {
                module: self.module.clone(),
                member: self.member.clone(),
            });
        };

        *slot = Snapshot::capture(receiver)?;

        Ok(())
    }

    /// Returns the module path of the target.
    #[inline(always)]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Returns the binding of the target.
    #[inline(always)]
    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Returns the owner type name of the target, if any.
    #[inline(always)]
    pub fn owner(&self) -> Option<&str> {
        self.binding.owner()
    }

    /// Returns the captured receiver, if the target has an owner type.
    #[inline(always)]
    pub fn receiver(&self) -> Option<&Snapshot> {
        self.binding.receiver()
    }

    /// Returns the member name of the target.
    #[inline(always)]
    pub fn member(&self) -> &str {
        &self.member
    }

    /// Returns the attribute hop, if any.
    #[inline(always)]
    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// Returns true if the reference has already resolved its Callable.
    #[inline(always)]
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Resolves the reference in the [global](Registry::global) registry.
    ///
    /// See [resolve_in](Self::resolve_in) for details.
    #[inline(always)]
    pub fn resolve(&self) -> RuntimeResult<Callable> {
        self.resolve_in(Registry::global())
    }

    /// Resolves the reference in the `registry`.
    ///
    /// The first successful resolution is memoized; subsequent calls return
    /// the memoized Callable without consulting any registry. Failed
    /// resolutions are not memoized, so a later call retries the lookup
    /// (e.g., after the missing module has been declared).
    ///
    /// See [Registry::lookup] for the resolution steps and errors.
    pub fn resolve_in(&self, registry: &Registry) -> RuntimeResult<Callable> {
        if let Some(callable) = self.resolved.get() {
            trace!(target: RESOLVE_LOG, "{self} already resolved.");

            return Ok(callable.clone());
        }

        let callable = registry.lookup(
            &self.module,
            self.binding.owner(),
            &self.member,
            self.attribute.as_deref(),
        )?;

        debug!(target: RESOLVE_LOG, "{self} resolved to {callable}.");

        let _ = self.resolved.set(callable.clone());

        Ok(callable)
    }

    /// Runs the target, resolving it in the [global](Registry::global)
    /// registry if needed.
    ///
    /// See [run_in](Self::run_in) for details.
    #[inline(always)]
    pub fn run(&self, arguments: &[Snapshot], keywords: &Keywords) -> RuntimeResult<Snapshot> {
        self.run_in(Registry::global(), arguments, keywords)
    }

    /// Runs the target, resolving it in the `registry` if needed.
    ///
    /// For references with an owner type, the captured receiver is passed to
    /// the target as the receiver. The receiver Snapshot itself is never
    /// modified by the call.
    ///
    /// Returns the target's result, or the target's error unchanged.
    pub fn run_in(
        &self,
        registry: &Registry,
        arguments: &[Snapshot],
        keywords: &Keywords,
    ) -> RuntimeResult<Snapshot> {
        let callable = self.resolve_in(registry)?;

        callable.call(self.binding.receiver(), arguments, keywords)
    }

    #[inline(always)]
    fn from_parts(
        module: CompactString,
        binding: Binding,
        member: CompactString,
        attribute: Option<CompactString>,
    ) -> Self {
        Self {
            module,
            binding,
            member,
            attribute,
            resolved: OnceCell::new(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SymbolRecord {
    module: CompactString,
    #[serde(default)]
    owner: Option<CompactString>,
    member: CompactString,
    #[serde(default)]
    attribute: Option<CompactString>,
    #[serde(default)]
    receiver: Option<Snapshot>,
}

impl From<SymbolReference> for SymbolRecord {
    fn from(reference: SymbolReference) -> Self {
        let (owner, receiver) = match reference.binding {
            Binding::Free => (None, None),
            Binding::Method { owner, receiver } => (Some(owner), Some(receiver)),
        };

        Self {
            module: reference.module,
            owner,
            member: reference.member,
            attribute: reference.attribute,
            receiver,
        }
    }
}

impl TryFrom<SymbolRecord> for SymbolReference {
    type Error = String;

    fn try_from(record: SymbolRecord) -> Result<Self, Self::Error> {
        let binding = match (record.owner, record.receiver) {
            (None, None) => Binding::Free,

            (None, Some(_)) => {
                return Err(format!(
                    "Symbol {}::{} has a receiver but no owner type.",
                    record.module, record.member,
                ))
            }

            (Some(owner), receiver) => Binding::Method {
                owner,
                receiver: receiver.unwrap_or_default(),
            },
        };

        Ok(Self::from_parts(
            record.module,
            binding,
            record.member,
            record.attribute,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use serde::{Deserialize, Serialize};

    use crate::runtime::{
        Binding,
        CaptureArgs,
        Keywords,
        Registry,
        RuntimeError,
        Snapshot,
        SymbolReference,
    };

    fn square(value: i64) -> i64 {
        value * value
    }

    #[derive(Clone, Serialize, Deserialize)]
    struct Offset {
        by: i64,
    }

    impl Offset {
        fn apply(&self, value: i64) -> i64 {
            value + self.by
        }
    }

    fn registry() -> Registry {
        let registry = Registry::new();

        registry.module(module_path!(), |module| {
            module.function("square", square);
            module.deferred("lazy_square", square);
            module.owner("Offset").method("apply", Offset::apply);

            Ok(())
        });

        registry
    }

    #[test]
    fn test_live_function_reference() {
        let registry = registry();
        let reference = SymbolReference::from_fn(square).unwrap();

        assert_eq!(reference.module(), module_path!());
        assert_eq!(reference.member(), "square");
        assert_eq!(reference.binding(), &Binding::Free);
        assert!(!reference.is_resolved());

        let result = reference
            .run_in(&registry, &(7,).capture().unwrap(), &Keywords::new())
            .unwrap();

        assert_eq!(result.restore::<i64>().unwrap(), 49);
        assert!(reference.is_resolved());
    }

    #[test]
    fn test_live_method_reference() {
        let registry = registry();
        let mut offset = Offset { by: 10 };

        let reference = SymbolReference::from_method(&offset, Offset::apply).unwrap();

        offset.by = 1000;

        let result = reference
            .run_in(&registry, &(5,).capture().unwrap(), &Keywords::new())
            .unwrap();

        assert_eq!(result.restore::<i64>().unwrap(), 15);
        assert_eq!(reference.to_string(), format!("{}::Offset::apply", module_path!()));
    }

    #[test]
    fn test_explicit_method_reference() {
        let registry = registry();
        let mut reference = SymbolReference::method(module_path!(), "Offset", "apply");

        let error = reference
            .run_in(&registry, &(5,).capture().unwrap(), &Keywords::new())
            .unwrap_err();

        assert!(matches!(error, RuntimeError::ReceiverMismatch { .. }));

        reference.bind_receiver(&Offset { by: -5 }).unwrap();

        let result = reference
            .run_in(&registry, &(5,).capture().unwrap(), &Keywords::new())
            .unwrap();

        assert_eq!(result.restore::<i64>().unwrap(), 0);
    }

    #[test]
    fn test_free_reference_rejects_receiver() {
        let mut reference = SymbolReference::new(module_path!(), "square");

        assert!(matches!(
            reference.bind_receiver(&Offset { by: 1 }),
            Err(RuntimeError::UnexpectedReceiver { .. }),
        ));
        assert_eq!(reference.binding(), &Binding::Free);

        let reference = reference.with_receiver(Snapshot::capture(&Offset { by: 1 }).unwrap());

        assert_eq!(reference.receiver(), None);
        assert_eq!(reference, SymbolReference::new(module_path!(), "square"));
    }

    #[test]
    fn test_attribute_reference() {
        let registry = registry();

        let reference = SymbolReference::new(module_path!(), "lazy_square").with_attribute("call");

        let result = reference
            .run_in(&registry, &(3,).capture().unwrap(), &Keywords::new())
            .unwrap();

        assert_eq!(result.restore::<i64>().unwrap(), 9);
        assert_eq!(reference.to_string(), format!("{}::lazy_square.call", module_path!()));

        let reference = SymbolReference::new(module_path!(), "lazy_square").with_attribute("cal");

        assert!(matches!(
            reference.resolve_in(&registry),
            Err(RuntimeError::AttributeNotFound { .. }),
        ));
    }

    #[test]
    fn test_resolution_memoized() {
        let registry = Registry::new();
        let loads = Arc::new(AtomicUsize::new(0));

        registry.module("memo", {
            let loads = loads.clone();

            move |module| {
                let _ = loads.fetch_add(1, Ordering::SeqCst);
                module.function("square", square);

                Ok(())
            }
        });

        let reference = SymbolReference::new("memo", "square");
        let arguments = (4,).capture().unwrap();

        let first = reference
            .run_in(&registry, &arguments, &Keywords::new())
            .unwrap();

        assert!(registry.unload("memo"));

        let second = reference
            .run_in(&registry, &arguments, &Keywords::new())
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let fresh = reference.clone();
        assert!(fresh.is_resolved());

        let decoded: SymbolReference =
            serde_json::from_str(&serde_json::to_string(&reference).unwrap()).unwrap();
        assert!(!decoded.is_resolved());
        assert!(matches!(
            decoded.resolve_in(&registry),
            Err(RuntimeError::ModuleNotFound { .. }),
        ));
    }

    #[test]
    fn test_errors_do_not_poison() {
        let registry = Registry::new();
        let reference = SymbolReference::new("late", "square");

        assert!(matches!(
            reference.resolve_in(&registry),
            Err(RuntimeError::ModuleNotFound { .. }),
        ));
        assert!(!reference.is_resolved());

        registry.module("late", |module| {
            module.function("square", square);
            Ok(())
        });

        assert!(reference.resolve_in(&registry).is_ok());
    }

    #[test]
    fn test_record_shape() {
        let reference = SymbolReference::method("geometry", "Offset", "apply")
            .with_receiver(Snapshot::capture(&Offset { by: 2 }).unwrap())
            .with_attribute("call");

        let record = serde_json::to_value(&reference).unwrap();

        assert_eq!(
            record,
            serde_json::json!({
                "module": "geometry",
                "owner": "Offset",
                "member": "apply",
                "attribute": "call",
                "receiver": { "by": 2 },
            }),
        );

        let decoded: SymbolReference = serde_json::from_value(record).unwrap();

        assert_eq!(decoded, reference);

        let class_level: SymbolReference = serde_json::from_value(serde_json::json!({
            "module": "geometry",
            "owner": "Offset",
            "member": "origin",
        }))
        .unwrap();

        assert_eq!(class_level.receiver(), Some(&Snapshot::null()));

        let malformed = serde_json::from_value::<SymbolReference>(serde_json::json!({
            "module": "geometry",
            "member": "origin",
            "receiver": 1,
        }));

        assert!(malformed.is_err());
    }
}
