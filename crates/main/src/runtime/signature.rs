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

use std::sync::Arc;

use compact_str::CompactString;
use serde::de::DeserializeOwned;

use crate::runtime::{RuntimeError, RuntimeResult, Snapshot};

/// A Rust function or closure that can be called with captured arguments.
///
/// This trait is automatically implemented for any `Fn(A1, ..., An) -> R`
/// with up to eight parameters, where each parameter type implements
/// [Deserialize](serde::Deserialize). You don't need to implement it
/// manually; it serves as a bound of the
/// [Callable::function](crate::runtime::Callable::function) constructor.
///
/// The `Args` type parameter is a tuple of the function's parameter types.
pub trait Function<Args, R>: Send + Sync + 'static {
    /// The number of the function's parameters.
    const ARITY: usize;

    /// Restores each argument from its Snapshot and calls the function.
    ///
    /// The length of `arguments` must be equal to [ARITY](Self::ARITY).
    fn invoke(&self, name: &CompactString, arguments: Vec<Snapshot>) -> RuntimeResult<R>;
}

/// A Rust method that can be called with a captured receiver and captured
/// arguments.
///
/// This trait is automatically implemented for any
/// `Fn(&S, A1, ..., An) -> R` with up to eight parameters after the
/// receiver, where the receiver type and each parameter type implement
/// [Deserialize](serde::Deserialize). In particular, it is implemented for
/// `&self` methods referred to by path: `Counter::get`.
///
/// The receiver is restored from its Snapshot on each call. The method
/// observes a fresh copy, and the Snapshot is never mutated.
pub trait Method<S, Args, R>: Send + Sync + 'static {
    /// The number of the method's parameters, excluding the receiver.
    const ARITY: usize;

    /// Restores the receiver and each argument from their Snapshots and
    /// calls the method.
    fn invoke(
        &self,
        name: &CompactString,
        receiver: &Snapshot,
        arguments: Vec<Snapshot>,
    ) -> RuntimeResult<R>;
}

macro_rules! impl_signatures {
    ($arity:expr; $($arg:ident: $ty:ident),*) => {
        impl<F, R, $($ty,)*> Function<($($ty,)*), R> for F
        where
            F: Fn($($ty),*) -> R + Send + Sync + 'static,
            $($ty: DeserializeOwned,)*
        {
            const ARITY: usize = $arity;

            #[allow(unused_mut, unused_variables)]
            fn invoke(&self, name: &CompactString, arguments: Vec<Snapshot>) -> RuntimeResult<R> {
                let mut arguments = Restore::new(name, arguments);

                $(
                    let $arg = arguments.next::<$ty>()?;
                )*

                Ok((self)($($arg),*))
            }
        }

        impl<F, S, R, $($ty,)*> Method<S, ($($ty,)*), R> for F
        where
            F: Fn(&S, $($ty),*) -> R + Send + Sync + 'static,
            S: DeserializeOwned,
            $($ty: DeserializeOwned,)*
        {
            const ARITY: usize = $arity;

            #[allow(unused_mut, unused_variables)]
            fn invoke(
                &self,
                name: &CompactString,
                receiver: &Snapshot,
                arguments: Vec<Snapshot>,
            ) -> RuntimeResult<R> {
                let this = match receiver.restore::<S>() {
                    Ok(this) => this,

                    Err(error) => {
                        return Err(RuntimeError::ReceiverMismatch {
                            function: name.clone(),
                            cause: Some(Arc::new(error)),
                        })
                    }
                };

                let mut arguments = Restore::new(name, arguments);

                $(
                    let $arg = arguments.next::<$ty>()?;
                )*

                Ok((self)(&this, $($arg),*))
            }
        }
    };
}

impl_signatures!(0;);
impl_signatures!(1; a1: A1);
impl_signatures!(2; a1: A1, a2: A2);
impl_signatures!(3; a1: A1, a2: A2, a3: A3);
impl_signatures!(4; a1: A1, a2: A2, a3: A3, a4: A4);
impl_signatures!(5; a1: A1, a2: A2, a3: A3, a4: A4, a5: A5);
impl_signatures!(6; a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6);
impl_signatures!(7; a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7);
impl_signatures!(8; a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8);

struct Restore<'a> {
    name: &'a CompactString,
    index: usize,
    arguments: std::vec::IntoIter<Snapshot>,
}

impl<'a> Restore<'a> {
    #[inline(always)]
    fn new(name: &'a CompactString, arguments: Vec<Snapshot>) -> Self {
        Self {
            name,
            index: 0,
            arguments: arguments.into_iter(),
        }
    }

    fn next<T: DeserializeOwned>(&mut self) -> RuntimeResult<T> {
        let index = self.index;

        self.index += 1;

        let Some(argument) = self.arguments.next() else {
            return Err(RuntimeError::MissingArgument {
                function: self.name.clone(),
                parameter: CompactString::from(format!("#{index}")),
            });
        };

        argument
            .restore::<T>()
            .map_err(|error| RuntimeError::ArgumentMismatch {
                function: self.name.clone(),
                index,
                cause: Arc::new(error),
            })
    }
}

#[cfg(test)]
mod tests {
    use compact_str::CompactString;
    use serde::{Deserialize, Serialize};

    use crate::runtime::{CaptureArgs, Function, Method, RuntimeError, Snapshot};

    #[derive(Serialize, Deserialize)]
    struct Meter {
        scale: i64,
    }

    impl Meter {
        fn measure(&self, value: i64) -> i64 {
            self.scale * value
        }
    }

    fn concat(left: String, right: String) -> String {
        format!("{left}{right}")
    }

    fn invoke_function<A, R>(function: impl Function<A, R>, arguments: Vec<Snapshot>) -> R {
        function
            .invoke(&CompactString::from("test"), arguments)
            .unwrap()
    }

    #[test]
    fn test_function_signature() {
        let arguments = ("foo", "bar").capture().unwrap();

        assert_eq!(invoke_function(concat, arguments), "foobar");
        assert_eq!(invoke_function(|| 7, Vec::new()), 7);
    }

    #[test]
    fn test_method_signature() {
        let receiver = Snapshot::capture(&Meter { scale: 3 }).unwrap();
        let arguments = (5,).capture().unwrap();

        let result =
            Method::invoke(&Meter::measure, &CompactString::from("measure"), &receiver, arguments)
                .unwrap();

        assert_eq!(result, 15);
    }

    #[test]
    fn test_argument_mismatch() {
        let name = CompactString::from("concat");
        let arguments = (1, "bar").capture().unwrap();

        let Err(error) = Function::invoke(&concat, &name, arguments) else {
            panic!("Invocation should fail.");
        };

        assert!(matches!(error, RuntimeError::ArgumentMismatch { index: 0, .. }));
    }

    #[test]
    fn test_receiver_mismatch() {
        let name = CompactString::from("measure");
        let arguments = (1,).capture().unwrap();

        let Err(error) = Method::invoke(&Meter::measure, &name, &Snapshot::null(), arguments)
        else {
            panic!("Invocation should fail.");
        };

        assert!(matches!(error, RuntimeError::ReceiverMismatch { cause: Some(_), .. }));
    }
}
