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

use std::fmt::{Display, Formatter};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::runtime::{Arguments, CaptureArgs, Invocation, RuntimeResult, SymbolReference};

/// Creates an [Invocation] of the free function item `function` with
/// positional arguments captured from the `args` tuple.
///
/// The function is referenced by its path (see
/// [SymbolReference::from_fn]), so the function must be declared in the
/// [Registry](crate::runtime::Registry) under the module named after its
/// Rust module path, which is what `module_path!()` returns inside that
/// module.
///
/// ```
/// use deferred_call::runtime::{defer, Registry};
///
/// fn add(a: i64, b: i64) -> i64 {
///     a + b
/// }
///
/// let registry = Registry::new();
///
/// let mut invocation = defer(add, (3, 4)).unwrap();
///
/// registry.module(invocation.target().module().to_string(), |module| {
///     module.function("add", add);
///     Ok(())
/// });
///
/// invocation.run_in(&registry).unwrap();
///
/// assert_eq!(invocation.result_as::<i64>().unwrap(), 7);
/// ```
#[inline]
pub fn defer<F>(function: F, args: impl CaptureArgs) -> RuntimeResult<Invocation> {
    Invocation::capture(SymbolReference::from_fn(function)?, args)
}

/// Creates an [Invocation] of the inherent `method` of type `S` bound to a
/// snapshot of the `receiver`.
///
/// The receiver and the `args` are captured immediately. See
/// [SymbolReference::from_method] for the naming rules.
#[inline]
pub fn defer_method<S, F>(
    receiver: &S,
    method: F,
    args: impl CaptureArgs,
) -> RuntimeResult<Invocation>
where
    S: Serialize + ?Sized,
{
    Invocation::capture(SymbolReference::from_method(receiver, method)?, args)
}

/// A reusable handle of a member whose entry point is declared one
/// attribute below the member itself, under the [Deferred::ENTRY] name.
///
/// Such members are declared with
/// [ModuleBuilder::deferred](crate::runtime::ModuleBuilder::deferred).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Deferred {
    symbol: SymbolReference,
}

impl Display for Deferred {
    #[inline(always)]
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.symbol, formatter)
    }
}

impl Deferred {
    /// The name of the attribute that holds the entry point.
    pub const ENTRY: &'static str = "call";

    /// Creates a handle of the `member` of the `module`.
    #[inline]
    pub fn new(module: impl Into<CompactString>, member: impl Into<CompactString>) -> Self {
        Self {
            symbol: SymbolReference::new(module, member).with_attribute(Self::ENTRY),
        }
    }

    /// Creates a handle named after the path of the free function item
    /// `function`.
    #[inline]
    pub fn of<F>(function: F) -> RuntimeResult<Self> {
        Ok(Self {
            symbol: SymbolReference::from_fn(function)?.with_attribute(Self::ENTRY),
        })
    }

    /// Returns the underlying reference, which includes the entry point
    /// attribute.
    #[inline(always)]
    pub fn symbol(&self) -> &SymbolReference {
        &self.symbol
    }

    /// Creates an [Invocation] with positional arguments captured from the
    /// `args` tuple.
    #[inline]
    pub fn call(&self, args: impl CaptureArgs) -> RuntimeResult<Invocation> {
        Ok(self.call_with(Arguments::capture(args)?))
    }

    /// Creates an [Invocation] with the captured `arguments`.
    #[inline(always)]
    pub fn call_with(&self, arguments: Arguments) -> Invocation {
        Invocation::new(self.symbol.clone(), arguments)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use crate::runtime::{
        defer,
        defer_method,
        Arguments,
        Callable,
        Deferred,
        Registry,
        RuntimeError,
    };

    #[derive(Clone, Serialize, Deserialize)]
    struct Calc {
        x: i64,
    }

    impl Calc {
        fn calc(&self, other: i64) -> i64 {
            self.x * self.x + other * other
        }
    }

    fn add(a: i64, b: i64) -> i64 {
        a + b
    }

    fn cube(value: i64) -> i64 {
        value * value * value
    }

    fn registry() -> Registry {
        let registry = Registry::new();

        registry.module(module_path!(), |module| {
            module.function("add", add);
            module.container("cube").attribute(
                Deferred::ENTRY,
                Callable::function("cube", cube).with_params(["value"]),
            );
            module.owner("Calc").method("calc", Calc::calc);

            Ok(())
        });

        registry
    }

    #[test]
    fn test_defer_function() {
        let registry = registry();

        let mut invocation = defer(add, (1, 3)).unwrap();

        assert_eq!(invocation.run_in(&registry).unwrap().restore::<i64>().unwrap(), 4);
    }

    #[test]
    fn test_defer_method_captures_receiver() {
        let registry = registry();

        let mut calc = Calc { x: 5 };

        let mut invocation = defer_method(&calc, Calc::calc, (1,)).unwrap();

        calc.x = 99;

        let _ = invocation.run_in(&registry).unwrap();

        assert_eq!(invocation.result_as::<i64>().unwrap(), 26);
        assert_eq!(calc.calc(0), 9801);
    }

    #[test]
    fn test_deferred_handle() {
        let registry = registry();

        let handle = Deferred::of(cube).unwrap();

        assert_eq!(handle.symbol().attribute(), Some(Deferred::ENTRY));
        assert_eq!(handle, Deferred::new(module_path!(), "cube"));

        let mut positional = handle.call((2,)).unwrap();
        let mut keyword = handle.call_with(Arguments::new().kwarg("value", &3).unwrap());

        assert_eq!(positional.run_in(&registry).unwrap().restore::<i64>().unwrap(), 8);
        assert_eq!(keyword.run_in(&registry).unwrap().restore::<i64>().unwrap(), 27);
    }

    #[test]
    fn test_deferred_container_not_callable() {
        let registry = registry();

        let mut invocation = defer(cube, (2,)).unwrap();

        assert!(matches!(
            invocation.run_in(&registry),
            Err(RuntimeError::MemberNotFound { .. }),
        ));
    }

    #[test]
    fn test_anonymous_rejected() {
        assert!(matches!(
            defer(|a: i64| a, (1,)),
            Err(RuntimeError::Anonymous { .. }),
        ));
    }
}
