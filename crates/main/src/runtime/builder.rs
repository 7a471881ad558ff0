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

use std::error::Error as StdError;

use ahash::AHashMap;
use compact_str::CompactString;
use serde::Serialize;

use crate::runtime::{
    Callable,
    Deferred,
    Entry,
    Function,
    Keywords,
    Method,
    Module,
    OwnerType,
    RuntimeResult,
    Snapshot,
};

/// A declaration interface of a [Module], provided to the module's loader
/// by the [Registry](crate::runtime::Registry).
///
/// Each declared name must be unique within the module (module-level
/// members) or within an owner type (its members). Declaring the same name
/// twice is a programming error, and the loader panics.
///
/// ```
/// use deferred_call::runtime::Registry;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Thermometer {
///     celsius: f64,
/// }
///
/// impl Thermometer {
///     fn fahrenheit(&self) -> f64 {
///         self.celsius * 1.8 + 32.0
///     }
/// }
///
/// let registry = Registry::new();
///
/// registry.module("weather", |module| {
///     module
///         .owner("Thermometer")
///         .method("fahrenheit", Thermometer::fahrenheit);
///
///     Ok(())
/// });
///
/// assert!(registry
///     .lookup("weather", Some("Thermometer"), "fahrenheit", None)
///     .is_ok());
/// ```
pub struct ModuleBuilder {
    name: CompactString,
    members: AHashMap<CompactString, Entry>,
    types: AHashMap<CompactString, OwnerType>,
}

impl ModuleBuilder {
    #[inline(always)]
    pub(super) fn new(name: CompactString) -> Self {
        Self {
            name,
            members: AHashMap::new(),
            types: AHashMap::new(),
        }
    }

    /// Returns the name of the module being declared.
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declares a module-level member with the `callable` entry point.
    ///
    /// ## Panics
    ///
    /// Panics if the member is already declared.
    pub fn entry(&mut self, name: &str, callable: Callable) -> EntryBuilder<'_> {
        let entry = declare(&mut self.members, &self.name, name);

        entry.callable = Some(callable);

        EntryBuilder { entry }
    }

    /// Declares a module-level member without an entry point of its own.
    ///
    /// Such a member can only be called through its
    /// [attributes](EntryBuilder::attribute).
    ///
    /// ## Panics
    ///
    /// Panics if the member is already declared.
    #[inline(always)]
    pub fn container(&mut self, name: &str) -> EntryBuilder<'_> {
        EntryBuilder {
            entry: declare(&mut self.members, &self.name, name),
        }
    }

    /// Declares a free function.
    ///
    /// See [Callable::function] for details.
    #[inline(always)]
    pub fn function<F, A, R>(&mut self, name: &str, function: F) -> EntryBuilder<'_>
    where
        F: Function<A, R>,
        A: 'static,
        R: Serialize + 'static,
    {
        self.entry(name, Callable::function(name, function))
    }

    /// Declares a fallible free function.
    ///
    /// See [Callable::try_function] for details.
    #[inline(always)]
    pub fn try_function<F, A, T, E>(&mut self, name: &str, function: F) -> EntryBuilder<'_>
    where
        F: Function<A, Result<T, E>>,
        A: 'static,
        T: Serialize + 'static,
        E: StdError + Send + Sync + 'static,
    {
        self.entry(name, Callable::try_function(name, function))
    }

    /// Declares a dynamic free function.
    ///
    /// See [Callable::dynamic] for details.
    #[inline(always)]
    pub fn dynamic(
        &mut self,
        name: &str,
        function: impl Fn(Option<&Snapshot>, &[Snapshot], &Keywords) -> RuntimeResult<Snapshot>
            + Send
            + Sync
            + 'static,
    ) -> EntryBuilder<'_> {
        self.entry(name, Callable::dynamic(name, function))
    }

    /// Declares a container member whose [Deferred::ENTRY] attribute is the
    /// `function`.
    ///
    /// This is the declaration counterpart of [Deferred::new].
    #[inline(always)]
    pub fn deferred<F, A, R>(&mut self, name: &str, function: F) -> EntryBuilder<'_>
    where
        F: Function<A, R>,
        A: 'static,
        R: Serialize + 'static,
    {
        let mut builder = self.container(name);

        let _ = builder.attribute(Deferred::ENTRY, Callable::function(name, function));

        builder
    }

    /// Returns a declaration interface of the owner type named `name`.
    ///
    /// The type is created on the first call. Subsequent calls with the same
    /// name continue the declaration of the same type.
    pub fn owner(&mut self, name: &str) -> TypeBuilder<'_> {
        let owner = self
            .types
            .entry(CompactString::from(name))
            .or_insert_with(|| OwnerType {
                name: CompactString::from(name),
                members: AHashMap::new(),
            });

        TypeBuilder {
            module: &self.name,
            owner,
        }
    }

    #[inline(always)]
    pub(super) fn finish(self) -> Module {
        Module {
            name: self.name,
            members: self.members,
            types: self.types,
        }
    }
}

/// A declaration interface of an [OwnerType].
///
/// Created by the [ModuleBuilder::owner] function.
pub struct TypeBuilder<'a> {
    module: &'a CompactString,
    owner: &'a mut OwnerType,
}

impl<'a> TypeBuilder<'a> {
    /// Returns the name of the type being declared.
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.owner.name
    }

    /// Declares a member of the type with the `callable` entry point.
    ///
    /// ## Panics
    ///
    /// Panics if the member is already declared.
    pub fn entry(&mut self, name: &str, callable: Callable) -> EntryBuilder<'_> {
        let path = format!("{}::{}", self.module, self.owner.name);
        let entry = declare(&mut self.owner.members, &path, name);

        entry.callable = Some(callable);

        EntryBuilder { entry }
    }

    /// Declares a method with a `&self`-like receiver.
    ///
    /// See [Callable::method] for details.
    #[inline(always)]
    pub fn method<F, S, A, R>(&mut self, name: &str, method: F) -> EntryBuilder<'_>
    where
        F: Method<S, A, R>,
        S: 'static,
        A: 'static,
        R: Serialize + 'static,
    {
        self.entry(name, Callable::method(name, method))
    }

    /// Declares a fallible method with a `&self`-like receiver.
    ///
    /// See [Callable::try_method] for details.
    #[inline(always)]
    pub fn try_method<F, S, A, T, E>(&mut self, name: &str, method: F) -> EntryBuilder<'_>
    where
        F: Method<S, A, Result<T, E>>,
        S: 'static,
        A: 'static,
        T: Serialize + 'static,
        E: StdError + Send + Sync + 'static,
    {
        self.entry(name, Callable::try_method(name, method))
    }

    /// Declares a class-level function of the type, which ignores the
    /// receiver.
    ///
    /// See [Callable::function] for details.
    #[inline(always)]
    pub fn function<F, A, R>(&mut self, name: &str, function: F) -> EntryBuilder<'_>
    where
        F: Function<A, R>,
        A: 'static,
        R: Serialize + 'static,
    {
        self.entry(name, Callable::function(name, function))
    }
}

/// A declaration interface of a single [Entry].
///
/// Created by the [ModuleBuilder] and [TypeBuilder] declaration functions.
pub struct EntryBuilder<'a> {
    entry: &'a mut Entry,
}

impl<'a> EntryBuilder<'a> {
    /// Assigns names to the parameters of the member's entry point.
    ///
    /// ## Panics
    ///
    /// Panics if the member is a container, or under the conditions of
    /// [Callable::with_params].
    pub fn params<I>(&mut self, params: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<CompactString>,
    {
        let Some(callable) = self.entry.callable.take() else {
            panic!("A container member cannot have parameters.");
        };

        self.entry.callable = Some(callable.with_params(params));

        self
    }

    /// Declares an attribute of the member.
    ///
    /// ## Panics
    ///
    /// Panics if the attribute is already declared.
    pub fn attribute(&mut self, name: &str, callable: Callable) -> &mut Self {
        if self
            .entry
            .attributes
            .insert(CompactString::from(name), callable)
            .is_some()
        {
            panic!("Attribute {name:?} declared twice.");
        }

        self
    }
}

fn declare<'a>(
    members: &'a mut AHashMap<CompactString, Entry>,
    path: &str,
    name: &str,
) -> &'a mut Entry {
    if members.contains_key(name) {
        panic!("Member {name:?} declared twice in {path:?}.");
    }

    members.entry(CompactString::from(name)).or_default()
}
