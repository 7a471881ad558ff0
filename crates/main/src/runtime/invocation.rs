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

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::runtime::{
    Arguments,
    CaptureArgs,
    Keywords,
    Registry,
    RuntimeError,
    RuntimeResult,
    Snapshot,
    SymbolReference,
};

/// A deferred call: a [SymbolReference] paired with a captured set of
/// arguments, which can be executed on demand.
///
/// The arguments are captured at construction time. Mutating the caller's
/// objects afterward does not change what the Invocation will execute, even
/// if the Invocation is stored or transmitted for a long time before it
/// runs.
///
/// ```
/// use deferred_call::runtime::{Invocation, Registry, SymbolReference};
///
/// fn add(a: i64, b: i64) -> i64 {
///     a + b
/// }
///
/// let registry = Registry::new();
///
/// registry.module("arithmetic", |module| {
///     module.function("add", add);
///     Ok(())
/// });
///
/// let mut invocation =
///     Invocation::capture(SymbolReference::new("arithmetic", "add"), (1, 3)).unwrap();
///
/// // The result is not available until the first successful run.
/// assert!(invocation.result().is_err());
///
/// invocation.run_in(&registry).unwrap();
///
/// assert_eq!(invocation.result_as::<i64>().unwrap(), 4);
/// ```
///
/// The serialized form of an Invocation consists of the target reference,
/// the positional arguments, and the keyword arguments only. The execution
/// state (the last result) is not serialized, and a deserialized Invocation
/// always starts in the "not yet run" state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "InvocationRecord", into = "InvocationRecord")]
pub struct Invocation {
    target: SymbolReference,
    args: Vec<Snapshot>,
    kwargs: Keywords,
    result: Option<Snapshot>,
}

impl PartialEq for Invocation {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target && self.args == other.args && self.kwargs == other.kwargs
    }
}

impl Display for Invocation {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_fmt(format_args!("{}(", self.target))?;

        let mut is_first = true;

        for argument in &self.args {
            match is_first {
                true => is_first = false,
                false => formatter.write_str(", ")?,
            }

            Display::fmt(argument, formatter)?;
        }

        for (name, argument) in &self.kwargs {
            match is_first {
                true => is_first = false,
                false => formatter.write_str(", ")?,
            }

            formatter.write_fmt(format_args!("{name}={argument}"))?;
        }

        formatter.write_str(")")
    }
}

impl Invocation {
    /// Creates an Invocation of the `target` with the captured `arguments`.
    #[inline]
    pub fn new(target: SymbolReference, arguments: Arguments) -> Self {
        let (args, kwargs) = arguments.into_parts();

        Self {
            target,
            args,
            kwargs,
            result: None,
        }
    }

    /// Creates an Invocation of the `target` with positional arguments
    /// captured from a tuple of serializable values.
    #[inline]
    pub fn capture(target: SymbolReference, args: impl CaptureArgs) -> RuntimeResult<Self> {
        Ok(Self::new(target, Arguments::capture(args)?))
    }

    /// Returns the target reference.
    #[inline(always)]
    pub fn target(&self) -> &SymbolReference {
        &self.target
    }

    /// Returns the captured positional arguments.
    #[inline(always)]
    pub fn args(&self) -> &[Snapshot] {
        &self.args
    }

    /// Returns the captured keyword arguments.
    #[inline(always)]
    pub fn kwargs(&self) -> &Keywords {
        &self.kwargs
    }

    /// Returns true if at least one run of this Invocation has completed
    /// successfully.
    #[inline(always)]
    pub fn has_run(&self) -> bool {
        self.result.is_some()
    }

    /// Runs the Invocation against the [global](Registry::global) registry.
    ///
    /// See [run_in](Self::run_in) for details.
    #[inline(always)]
    pub fn run(&mut self) -> RuntimeResult<Snapshot> {
        self.run_in(Registry::global())
    }

    /// Runs the Invocation, resolving the target in the `registry` if
    /// needed, and returns the result.
    ///
    /// Every call executes the target again. On success, the result is
    /// stored and becomes available through [result](Self::result). On
    /// failure, the error is returned unchanged, and the result of the
    /// previous successful run, if any, stays in place.
    pub fn run_in(&mut self, registry: &Registry) -> RuntimeResult<Snapshot> {
        let result = self.target.run_in(registry, &self.args, &self.kwargs)?;

        self.result = Some(result.clone());

        Ok(result)
    }

    /// Returns the result of the most recent successful run.
    ///
    /// Returns [RuntimeError::ResultNotAvailable] if the Invocation has not
    /// been run successfully yet.
    #[inline]
    pub fn result(&self) -> RuntimeResult<&Snapshot> {
        self.result.as_ref().ok_or(RuntimeError::ResultNotAvailable)
    }

    /// Restores the result of the most recent successful run into a value of
    /// type `T`.
    ///
    /// Returns [RuntimeError::ResultNotAvailable] if the Invocation has not
    /// been run successfully yet, and [RuntimeError::Target] if the result
    /// cannot be restored as `T`.
    pub fn result_as<T: DeserializeOwned>(&self) -> RuntimeResult<T> {
        self.result()?.restore::<T>().map_err(RuntimeError::target)
    }
}

#[derive(Serialize, Deserialize)]
struct InvocationRecord {
    target: SymbolReference,
    #[serde(default)]
    args: Vec<Snapshot>,
    #[serde(default)]
    kwargs: Keywords,
}

impl From<Invocation> for InvocationRecord {
    #[inline(always)]
    fn from(invocation: Invocation) -> Self {
        Self {
            target: invocation.target,
            args: invocation.args,
            kwargs: invocation.kwargs,
        }
    }
}

impl From<InvocationRecord> for Invocation {
    #[inline(always)]
    fn from(record: InvocationRecord) -> Self {
        Self {
            target: record.target,
            args: record.args,
            kwargs: record.kwargs,
            result: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fmt::{Display, Formatter},
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
        },
    };

    use crate::runtime::{Arguments, Invocation, Registry, RuntimeError, SymbolReference};

    #[derive(Debug)]
    struct Rejected;

    impl Display for Rejected {
        fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("rejected")
        }
    }

    impl std::error::Error for Rejected {}

    fn check(value: i32) -> Result<i32, Rejected> {
        match value >= 0 {
            true => Ok(value),
            false => Err(Rejected),
        }
    }

    fn scale(value: f64, factor: f64) -> f64 {
        value * factor
    }

    fn registry(calls: Arc<AtomicUsize>) -> Registry {
        let registry = Registry::new();

        registry.module("jobs", move |module| {
            module.try_function("check", check);
            module.function("scale", scale).params(["value", "factor"]);

            let calls = calls.clone();
            module.function("tick", move || calls.fetch_add(1, Ordering::SeqCst) + 1);

            Ok(())
        });

        registry
    }

    #[test]
    fn test_result_before_run() {
        let invocation = Invocation::capture(SymbolReference::new("jobs", "check"), (1,)).unwrap();

        assert!(!invocation.has_run());
        assert!(matches!(invocation.result(), Err(RuntimeError::ResultNotAvailable)));
        assert!(matches!(
            invocation.result_as::<i32>(),
            Err(RuntimeError::ResultNotAvailable),
        ));
    }

    #[test]
    fn test_every_run_executes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = registry(calls.clone());

        let mut invocation = Invocation::capture(SymbolReference::new("jobs", "tick"), ()).unwrap();

        let _ = invocation.run_in(&registry).unwrap();
        let _ = invocation.run_in(&registry).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(invocation.result_as::<usize>().unwrap(), 2);
        assert!(invocation.has_run());
    }

    #[test]
    fn test_keyword_invocation() {
        let registry = registry(Arc::default());

        let arguments = Arguments::capture((2.0,)).unwrap().kwarg("factor", &1.5).unwrap();

        let mut invocation = Invocation::new(SymbolReference::new("jobs", "scale"), arguments);

        let result = invocation.run_in(&registry).unwrap();

        assert_eq!(result.restore::<f64>().unwrap(), 3.0);
        assert_eq!(invocation.to_string(), "jobs::scale(2.0, factor=1.5)");
    }

    #[test]
    fn test_target_error_propagates() {
        let registry = registry(Arc::default());

        let mut invocation =
            Invocation::capture(SymbolReference::new("jobs", "check"), (-1,)).unwrap();

        let error = invocation.run_in(&registry).unwrap_err();

        assert!(error.target_cause().unwrap().is::<Rejected>());
        assert!(!invocation.has_run());
    }

    #[test]
    fn test_failed_rerun_keeps_result() {
        let closed = Arc::new(AtomicBool::new(false));
        let registry = Registry::new();

        registry.module("gates", {
            let closed = closed.clone();

            move |module| {
                let closed = closed.clone();

                module.try_function("pass", move |value: i32| {
                    match closed.load(Ordering::SeqCst) {
                        true => Err(Rejected),
                        false => Ok(value),
                    }
                });

                Ok(())
            }
        });

        let mut invocation =
            Invocation::capture(SymbolReference::new("gates", "pass"), (5,)).unwrap();

        let _ = invocation.run_in(&registry).unwrap();

        closed.store(true, Ordering::SeqCst);

        assert!(invocation.run_in(&registry).is_err());
        assert_eq!(invocation.result_as::<i32>().unwrap(), 5);
    }

    #[test]
    fn test_decoded_invocation_not_run() {
        let registry = registry(Arc::default());

        let mut invocation =
            Invocation::capture(SymbolReference::new("jobs", "check"), (5,)).unwrap();

        let _ = invocation.run_in(&registry).unwrap();

        assert!(registry.unload("jobs"));

        let mut copy: Invocation =
            serde_json::from_str(&serde_json::to_string(&invocation).unwrap()).unwrap();

        assert_eq!(copy, invocation);
        assert!(!copy.has_run());
        assert!(matches!(
            copy.run_in(&registry),
            Err(RuntimeError::ModuleNotFound { .. }),
        ));

        // The original target is still resolved, so it keeps running.
        let _ = invocation.run_in(&registry).unwrap();
        assert_eq!(invocation.result_as::<i32>().unwrap(), 5);
    }

    #[test]
    fn test_record_shape() {
        let invocation = Invocation::new(
            SymbolReference::new("jobs", "scale"),
            Arguments::capture((1.0,)).unwrap().kwarg("factor", &2.0).unwrap(),
        );

        let record = serde_json::to_value(&invocation).unwrap();

        assert_eq!(
            record,
            serde_json::json!({
                "target": {
                    "module": "jobs",
                    "owner": null,
                    "member": "scale",
                    "attribute": null,
                    "receiver": null,
                },
                "args": [1.0],
                "kwargs": { "factor": 2.0 },
            }),
        );
    }
}
