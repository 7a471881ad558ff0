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
    any::type_name,
    fmt::{Display, Formatter},
};

use compact_str::CompactString;

use crate::runtime::{RuntimeError, RuntimeResult};

/// A fully qualified location of a named function or method in the Rust
/// source code.
///
/// The path is extracted from the type name of a function item, so it is
/// available only for items declared by name: free functions
/// (`crate::module::function`) and inherent methods
/// (`crate::module::Type::method`).
///
/// The `module` part is the same string that [module_path] returns inside the
/// declaring module. This makes the path match the
/// [registry declarations](crate::runtime::Registry::module) made with
/// `module_path!()`.
///
/// ```
/// use deferred_call::runtime::SymbolPath;
///
/// fn double(value: i32) -> i32 {
///     value * 2
/// }
///
/// let path = SymbolPath::of_fn(double).unwrap();
///
/// assert_eq!(path.member(), "double");
/// assert!(path.owner().is_none());
///
/// // Closures have no stable name.
/// assert!(SymbolPath::of_fn(|value: i32| value * 2).is_err());
/// ```
///
/// The [Display] implementation prints the full path:
/// `crate::module::Type::method`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct SymbolPath {
    module: CompactString,
    owner: Option<CompactString>,
    member: CompactString,
}

impl Display for SymbolPath {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.module)?;

        if let Some(owner) = &self.owner {
            formatter.write_fmt(format_args!("::{owner}"))?;
        }

        formatter.write_fmt(format_args!("::{}", self.member))
    }
}

impl SymbolPath {
    /// Extracts the path of a free function item.
    ///
    /// Returns [RuntimeError::Anonymous] if `F` is a closure, a function
    /// pointer, a generic function instantiation, or a trait method.
    pub fn of_fn<F>(_function: F) -> RuntimeResult<Self> {
        let name = type_name::<F>();

        let (module, member) = split_item(name)?;

        Ok(Self {
            module: CompactString::from(module),
            owner: None,
            member: CompactString::from(member),
        })
    }

    /// Extracts the path of an inherent method of type `S`.
    ///
    /// The owner type and its module are taken from the type name of `S`,
    /// and the method's name from the type name of `F`, which must be
    /// declared directly on `S`.
    ///
    /// Returns [RuntimeError::Anonymous] if the method does not belong to `S`
    /// by path, or if either name is not a plain path (e.g., `S` is a generic
    /// type instantiation).
    pub fn of_method<S: ?Sized, F>(_method: F) -> RuntimeResult<Self> {
        let owner_path = type_name::<S>();
        let method_path = type_name::<F>();

        let (module, owner) = split_item(owner_path)?;

        let Some(member) = method_path
            .strip_prefix(owner_path)
            .and_then(|rest| rest.strip_prefix("::"))
        else {
            return Err(anonymous(method_path));
        };

        if !is_ident(member) {
            return Err(anonymous(method_path));
        }

        Ok(Self {
            module: CompactString::from(module),
            owner: Some(CompactString::from(owner)),
            member: CompactString::from(member),
        })
    }

    /// Returns the module path of the item.
    #[inline(always)]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Returns the name of the method's owner type, or None for free
    /// functions.
    #[inline(always)]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Returns the function's or method's name.
    #[inline(always)]
    pub fn member(&self) -> &str {
        &self.member
    }

    #[inline(always)]
    pub(crate) fn into_parts(self) -> (CompactString, Option<CompactString>, CompactString) {
        (self.module, self.owner, self.member)
    }
}

fn split_item(path: &str) -> RuntimeResult<(&str, &str)> {
    let Some((module, item)) = path.rsplit_once("::") else {
        return Err(anonymous(path));
    };

    if !is_ident(item) || !module.split("::").all(is_ident) {
        return Err(anonymous(path));
    }

    Ok((module, item))
}

// Plain identifiers only: rejects `{{closure}}`, generic arguments, and
// function pointer signatures.
fn is_ident(string: &str) -> bool {
    let mut chars = string.chars();

    let Some(first) = chars.next() else {
        return false;
    };

    if !first.is_alphabetic() && first != '_' {
        return false;
    }

    chars.all(|ch| ch.is_alphanumeric() || ch == '_')
}

#[inline(always)]
fn anonymous(name: &str) -> RuntimeError {
    RuntimeError::Anonymous {
        name: CompactString::from(name),
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::{RuntimeError, SymbolPath};

    fn triple(value: i32) -> i32 {
        value * 3
    }

    fn identity<T>(value: T) -> T {
        value
    }

    struct Gauge;

    impl Gauge {
        fn read(&self) -> u8 {
            0
        }
    }

    struct Other;

    #[test]
    fn test_free_function_path() {
        let path = SymbolPath::of_fn(triple).unwrap();

        assert_eq!(path.module(), module_path!());
        assert_eq!(path.member(), "triple");
        assert_eq!(path.owner(), None);
        assert_eq!(path.to_string(), format!("{}::triple", module_path!()));
    }

    #[test]
    fn test_method_path() {
        let path = SymbolPath::of_method::<Gauge, _>(Gauge::read).unwrap();

        assert_eq!(path.module(), module_path!());
        assert_eq!(path.owner(), Some("Gauge"));
        assert_eq!(path.member(), "read");
    }

    #[test]
    fn test_unnameable_callables() {
        let closure = |value: i32| value;
        let pointer: fn(i32) -> i32 = triple;

        assert!(matches!(
            SymbolPath::of_fn(closure),
            Err(RuntimeError::Anonymous { .. }),
        ));
        assert!(SymbolPath::of_fn(pointer).is_err());
        assert!(SymbolPath::of_fn(identity::<i32>).is_err());
        assert!(SymbolPath::of_method::<Other, _>(Gauge::read).is_err());
    }
}
