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
    error::Error as StdError,
    fmt::{Debug, Display, Formatter},
    sync::Arc,
};

use compact_str::CompactString;
use serde::Serialize;

use crate::runtime::{Function, Keywords, Method, RuntimeError, RuntimeResult, Snapshot};

type TypedBody = dyn Fn(Option<&Snapshot>, Vec<Snapshot>) -> RuntimeResult<Snapshot> + Send + Sync;

type DynamicBody =
    dyn Fn(Option<&Snapshot>, &[Snapshot], &Keywords) -> RuntimeResult<Snapshot> + Send + Sync;

/// A type-erased handle of a function or method stored in the
/// [Registry](crate::runtime::Registry).
///
/// A Callable is what a [SymbolReference](crate::runtime::SymbolReference)
/// resolves to. It accepts a captured receiver (for methods), captured
/// positional arguments, and captured keyword arguments, and returns the
/// captured result.
///
/// Typed Callables are created from ordinary Rust functions:
///
/// ```
/// use deferred_call::runtime::{CaptureArgs, Callable, Keywords};
///
/// fn area(width: u32, height: u32) -> u32 {
///     width * height
/// }
///
/// let callable = Callable::function("area", area).with_params(["width", "height"]);
///
/// let result = callable
///     .call(None, &(3, 4).capture().unwrap(), &Keywords::new())
///     .unwrap();
///
/// assert_eq!(result.restore::<u32>().unwrap(), 12);
/// ```
///
/// Typed Callables bind positional arguments to parameters in order, and
/// keyword arguments to [named parameters](Self::with_params) by name.
///
/// The Callable is cheap to clone.
///
/// The [Display] implementation renders the Callable's signature:
/// `fn area(width, height)`.
#[derive(Clone)]
pub struct Callable {
    inner: Arc<CallableInner>,
}

#[derive(Clone)]
struct CallableInner {
    name: CompactString,
    receiver: bool,
    arity: Option<usize>,
    params: Option<Vec<CompactString>>,
    body: Body,
}

#[derive(Clone)]
enum Body {
    Typed(Arc<TypedBody>),
    Dynamic(Arc<DynamicBody>),
}

impl Debug for Callable {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Callable")
            .field("name", &self.inner.name)
            .field("receiver", &self.inner.receiver)
            .field("arity", &self.inner.arity)
            .field("params", &self.inner.params)
            .finish_non_exhaustive()
    }
}

impl Display for Callable {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_fmt(format_args!("fn {}(", self.inner.name))?;

        let mut is_first = true;

        if self.inner.receiver {
            is_first = false;
            formatter.write_str("&self")?;
        }

        match (self.inner.arity, &self.inner.params) {
            (_, Some(params)) => {
                for param in params {
                    match is_first {
                        true => is_first = false,
                        false => formatter.write_str(", ")?,
                    }

                    formatter.write_str(param)?;
                }
            }

            (Some(arity), None) => {
                for _ in 0..arity {
                    match is_first {
                        true => is_first = false,
                        false => formatter.write_str(", ")?,
                    }

                    formatter.write_str("_")?;
                }
            }

            (None, None) => {
                if !is_first {
                    formatter.write_str(", ")?;
                }

                formatter.write_str("..")?;
            }
        }

        formatter.write_str(")")
    }
}

impl Callable {
    /// Creates a Callable from a Rust function whose parameters implement
    /// [Deserialize](serde::Deserialize) and whose result implements
    /// [Serialize].
    ///
    /// The `name` is used in error messages and in the Display
    /// representation only; the registry key is specified separately.
    pub fn function<F, A, R>(name: &str, function: F) -> Self
    where
        F: Function<A, R>,
        A: 'static,
        R: Serialize + 'static,
    {
        let name = CompactString::from(name);
        let owned_name = name.clone();

        Self::typed(name, false, F::ARITY, move |_, arguments| {
            let output = function.invoke(&owned_name, arguments)?;

            Snapshot::capture(&output)
        })
    }

    /// Creates a Callable from a fallible Rust function.
    ///
    /// If the function returns [Err], the call fails with
    /// [RuntimeError::Target] that holds the original error object.
    pub fn try_function<F, A, T, E>(name: &str, function: F) -> Self
    where
        F: Function<A, Result<T, E>>,
        A: 'static,
        T: Serialize + 'static,
        E: StdError + Send + Sync + 'static,
    {
        let name = CompactString::from(name);
        let owned_name = name.clone();

        Self::typed(name, false, F::ARITY, move |_, arguments| {
            match function.invoke(&owned_name, arguments)? {
                Ok(output) => Snapshot::capture(&output),
                Err(error) => Err(RuntimeError::target(error)),
            }
        })
    }

    /// Creates a Callable from a Rust method with a `&self`-like receiver.
    ///
    /// When called, the receiver is restored from the receiver Snapshot. A
    /// call without a receiver fails with [RuntimeError::ReceiverMismatch].
    pub fn method<F, S, A, R>(name: &str, method: F) -> Self
    where
        F: Method<S, A, R>,
        S: 'static,
        A: 'static,
        R: Serialize + 'static,
    {
        let name = CompactString::from(name);
        let owned_name = name.clone();

        Self::typed(name, true, F::ARITY, move |receiver, arguments| {
            let Some(receiver) = receiver else {
                return Err(RuntimeError::ReceiverMismatch {
                    function: owned_name.clone(),
                    cause: None,
                });
            };

            let output = method.invoke(&owned_name, receiver, arguments)?;

            Snapshot::capture(&output)
        })
    }

    /// Creates a Callable from a fallible Rust method.
    ///
    /// This is a combination of [Callable::method] and
    /// [Callable::try_function].
    pub fn try_method<F, S, A, T, E>(name: &str, method: F) -> Self
    where
        F: Method<S, A, Result<T, E>>,
        S: 'static,
        A: 'static,
        T: Serialize + 'static,
        E: StdError + Send + Sync + 'static,
    {
        let name = CompactString::from(name);
        let owned_name = name.clone();

        Self::typed(name, true, F::ARITY, move |receiver, arguments| {
            let Some(receiver) = receiver else {
                return Err(RuntimeError::ReceiverMismatch {
                    function: owned_name.clone(),
                    cause: None,
                });
            };

            match method.invoke(&owned_name, receiver, arguments)? {
                Ok(output) => Snapshot::capture(&output),
                Err(error) => Err(RuntimeError::target(error)),
            }
        })
    }

    /// Creates an untyped Callable that receives the raw receiver, positional
    /// arguments, and keyword arguments as is.
    ///
    /// No argument binding is performed for dynamic Callables. Any
    /// [RuntimeError] returned by the `function` propagates to the caller
    /// unchanged.
    ///
    /// ```
    /// use deferred_call::runtime::{Callable, Keywords, Snapshot};
    ///
    /// let count = Callable::dynamic("count", |_, arguments, keywords| {
    ///     Snapshot::capture(&(arguments.len() + keywords.len()))
    /// });
    ///
    /// let result = count.call(None, &[Snapshot::null()], &Keywords::new()).unwrap();
    ///
    /// assert_eq!(result.restore::<usize>().unwrap(), 1);
    /// ```
    pub fn dynamic(
        name: &str,
        function: impl Fn(Option<&Snapshot>, &[Snapshot], &Keywords) -> RuntimeResult<Snapshot>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(CallableInner {
                name: CompactString::from(name),
                receiver: false,
                arity: None,
                params: None,
                body: Body::Dynamic(Arc::new(function)),
            }),
        }
    }

    /// Assigns names to the Callable's parameters, enabling keyword
    /// arguments.
    ///
    /// ## Panics
    ///
    /// Panics if the number of names does not match the function's arity,
    /// if the names are not unique, or if the Callable is
    /// [dynamic](Self::dynamic).
    pub fn with_params<I>(mut self, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<CompactString>,
    {
        let params = params.into_iter().map(Into::into).collect::<Vec<_>>();

        let inner = Arc::make_mut(&mut self.inner);

        let Some(arity) = inner.arity else {
            panic!("Dynamic function {:?} cannot have named parameters.", inner.name);
        };

        if params.len() != arity {
            panic!(
                "Function {:?} has {arity} parameter(s), but {} name(s) were given.",
                inner.name,
                params.len(),
            );
        }

        for (index, param) in params.iter().enumerate() {
            if params[..index].contains(param) {
                panic!(
                    "Function {:?} has duplicate parameter name {param:?}.",
                    inner.name,
                );
            }
        }

        inner.params = Some(params);

        self
    }

    /// Returns the function's name.
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the number of parameters (excluding the receiver), or None if
    /// the Callable is [dynamic](Self::dynamic).
    #[inline(always)]
    pub fn arity(&self) -> Option<usize> {
        self.inner.arity
    }

    /// Returns the parameter names, if they were [assigned](Self::with_params).
    #[inline(always)]
    pub fn params(&self) -> Option<&[CompactString]> {
        self.inner.params.as_deref()
    }

    /// Returns true if the Callable requires a receiver.
    #[inline(always)]
    pub fn has_receiver(&self) -> bool {
        self.inner.receiver
    }

    /// Calls the function.
    ///
    /// The `receiver` is ignored by Callables that don't
    /// [require](Self::has_receiver) one.
    ///
    /// Errors from argument binding are reported as
    /// [ArityMismatch](RuntimeError::ArityMismatch),
    /// [MissingArgument](RuntimeError::MissingArgument),
    /// [UnexpectedKeyword](RuntimeError::UnexpectedKeyword),
    /// [DuplicateArgument](RuntimeError::DuplicateArgument), and
    /// [ArgumentMismatch](RuntimeError::ArgumentMismatch). Failures of the
    /// function itself are propagated as is.
    pub fn call(
        &self,
        receiver: Option<&Snapshot>,
        arguments: &[Snapshot],
        keywords: &Keywords,
    ) -> RuntimeResult<Snapshot> {
        match &self.inner.body {
            Body::Typed(body) => body(receiver, self.bind(arguments, keywords)?),
            Body::Dynamic(body) => body(receiver, arguments, keywords),
        }
    }

    #[inline(always)]
    fn typed(
        name: CompactString,
        receiver: bool,
        arity: usize,
        body: impl Fn(Option<&Snapshot>, Vec<Snapshot>) -> RuntimeResult<Snapshot>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(CallableInner {
                name,
                receiver,
                arity: Some(arity),
                params: None,
                body: Body::Typed(Arc::new(body)),
            }),
        }
    }

    fn bind(&self, arguments: &[Snapshot], keywords: &Keywords) -> RuntimeResult<Vec<Snapshot>> {
        let inner = self.inner.as_ref();
        let arity = inner.arity.unwrap_or(arguments.len());

        if arguments.len() > arity {
            return Err(RuntimeError::ArityMismatch {
                function: inner.name.clone(),
                parameters: arity,
                arguments: arguments.len(),
            });
        }

        let mut slots = Vec::with_capacity(arity);

        slots.extend(arguments.iter().cloned().map(Some));
        slots.resize(arity, None);

        for (keyword, value) in keywords {
            let position = inner
                .params
                .as_ref()
                .and_then(|params| params.iter().position(|param| param == keyword));

            let Some(index) = position else {
                return Err(RuntimeError::UnexpectedKeyword {
                    function: inner.name.clone(),
                    keyword: keyword.clone(),
                });
            };

            let slot = &mut slots[index];

            if slot.is_some() {
                return Err(RuntimeError::DuplicateArgument {
                    function: inner.name.clone(),
                    parameter: keyword.clone(),
                });
            }

            *slot = Some(value.clone());
        }

        let mut bound = Vec::with_capacity(arity);

        for (index, slot) in slots.into_iter().enumerate() {
            let Some(value) = slot else {
                let parameter = match &inner.params {
                    Some(params) => params[index].clone(),
                    None => CompactString::from(format!("#{index}")),
                };

                return Err(RuntimeError::MissingArgument {
                    function: inner.name.clone(),
                    parameter,
                });
            };

            bound.push(value);
        }

        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use std::{fmt::Display, num::ParseIntError};

    use serde::{Deserialize, Serialize};

    use crate::runtime::{Arguments, Callable, CaptureArgs, Keywords, RuntimeError, Snapshot};

    fn volume(width: i32, height: i32, depth: i32) -> i32 {
        width * height * depth
    }

    fn parse(text: String) -> Result<i32, ParseIntError> {
        text.parse()
    }

    #[derive(Serialize, Deserialize)]
    struct Greeter {
        greeting: String,
    }

    impl Greeter {
        fn greet(&self, name: String) -> String {
            format!("{}, {name}!", self.greeting)
        }
    }

    fn call(callable: &Callable, arguments: Arguments) -> Result<Snapshot, RuntimeError> {
        let (positional, keywords) = arguments.into_parts();

        callable.call(None, &positional, &keywords)
    }

    #[test]
    fn test_keyword_binding() {
        let callable = Callable::function("volume", volume).with_params(["w", "h", "d"]);

        let arguments = Arguments::capture((2,))
            .unwrap()
            .kwarg("d", &5)
            .unwrap()
            .kwarg("h", &3)
            .unwrap();

        let result = call(&callable, arguments).unwrap();

        assert_eq!(result.restore::<i32>().unwrap(), 30);
        assert_eq!(callable.to_string(), "fn volume(w, h, d)");
    }

    #[test]
    fn test_binding_errors() {
        let callable = Callable::function("volume", volume).with_params(["w", "h", "d"]);

        let error = call(&callable, Arguments::capture((1, 2, 3, 4)).unwrap()).unwrap_err();
        assert!(matches!(
            error,
            RuntimeError::ArityMismatch {
                parameters: 3,
                arguments: 4,
                ..
            },
        ));

        let error = call(&callable, Arguments::capture((1, 2)).unwrap()).unwrap_err();
        assert!(matches!(error, RuntimeError::MissingArgument { parameter, .. } if parameter == "d"));

        let arguments = Arguments::capture((1, 2, 3))
            .unwrap()
            .kwarg("x", &0)
            .unwrap();
        let error = call(&callable, arguments).unwrap_err();
        assert!(matches!(error, RuntimeError::UnexpectedKeyword { keyword, .. } if keyword == "x"));

        let arguments = Arguments::capture((1, 2, 3))
            .unwrap()
            .kwarg("w", &0)
            .unwrap();
        let error = call(&callable, arguments).unwrap_err();
        assert!(matches!(error, RuntimeError::DuplicateArgument { parameter, .. } if parameter == "w"));
    }

    #[test]
    fn test_unnamed_params_reject_keywords() {
        let callable = Callable::function("volume", volume);

        let arguments = Arguments::capture((1, 2)).unwrap().kwarg("d", &3).unwrap();

        let error = call(&callable, arguments).unwrap_err();

        assert!(matches!(error, RuntimeError::UnexpectedKeyword { .. }));
        assert_eq!(callable.to_string(), "fn volume(_, _, _)");
    }

    #[test]
    fn test_fallible_function() {
        let callable = Callable::try_function("parse", parse);

        let result = call(&callable, Arguments::capture(("42",)).unwrap()).unwrap();
        assert_eq!(result.restore::<i32>().unwrap(), 42);

        let error = call(&callable, Arguments::capture(("4x2",)).unwrap()).unwrap_err();
        let cause = error.target_cause().unwrap();

        assert!(cause.is::<ParseIntError>());
        assert_eq!(error.to_string(), "4x2".parse::<i32>().unwrap_err().to_string());
    }

    #[test]
    fn test_method_receiver() {
        let callable = Callable::method("greet", Greeter::greet);
        let receiver = Snapshot::capture(&Greeter {
            greeting: String::from("Hello"),
        })
        .unwrap();

        let arguments = ("world",).capture().unwrap();

        let result = callable
            .call(Some(&receiver), &arguments, &Keywords::new())
            .unwrap();

        assert_eq!(result.restore::<String>().unwrap(), "Hello, world!");
        assert_eq!(callable.to_string(), "fn greet(&self, _)");

        let error = callable
            .call(None, &arguments, &Keywords::new())
            .unwrap_err();

        assert!(matches!(error, RuntimeError::ReceiverMismatch { cause: None, .. }));
    }

    #[test]
    fn test_dynamic_propagates_errors() {
        let callable = Callable::dynamic("fail", |_, _, _| Err(RuntimeError::ResultNotAvailable));

        let error = callable.call(None, &[], &Keywords::new()).unwrap_err();

        assert!(matches!(error, RuntimeError::ResultNotAvailable));
        assert_eq!(callable.to_string(), "fn fail(..)");
    }

    #[test]
    #[should_panic]
    fn test_params_arity_checked() {
        let _ = Callable::function("volume", volume).with_params(["w", "h"]);
    }

    fn assert_display(value: impl Display, expected: &str) {
        assert_eq!(value.to_string(), expected);
    }

    #[test]
    fn test_zero_arity_display() {
        assert_display(Callable::function("now", || 0u64), "fn now()");
    }
}
