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
    collections::BTreeMap,
    fmt::{Debug, Display, Formatter},
    sync::Arc,
};

use compact_str::CompactString;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::runtime::{lossless::Lossless, RuntimeError, RuntimeResult};

/// Keyword arguments of a deferred call, keyed by parameter name.
pub type Keywords = BTreeMap<CompactString, Snapshot>;

/// A deep, structurally independent copy of a value taken at a specific
/// point in time.
///
/// A Snapshot owns its data entirely: it shares no substructure with the
/// value it was captured from, so mutating the original value after the
/// capture has no effect on the Snapshot.
///
/// Any type implementing [Serialize] can be captured, and any type
/// implementing [Deserialize] can be restored from a compatible Snapshot.
/// Types without a serde representation cannot be captured.
///
/// ```
/// use deferred_call::runtime::Snapshot;
///
/// let mut original = vec![1, 2, 3];
/// let snapshot = Snapshot::capture(&original).unwrap();
///
/// original.push(4);
///
/// assert_eq!(snapshot.restore::<Vec<i32>>().unwrap(), vec![1, 2, 3]);
/// ```
///
/// The [Display] implementation prints the snapshot's JSON form.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Value);

impl Debug for Snapshot {
    #[inline(always)]
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.0, formatter)
    }
}

impl Display for Snapshot {
    #[inline(always)]
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, formatter)
    }
}

impl From<Value> for Snapshot {
    #[inline(always)]
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<Snapshot> for Value {
    #[inline(always)]
    fn from(value: Snapshot) -> Self {
        value.0
    }
}

impl Snapshot {
    /// Returns a Snapshot of nothing.
    ///
    /// A null Snapshot serves as the receiver of class-level calls.
    #[inline(always)]
    pub const fn null() -> Self {
        Self(Value::Null)
    }

    /// Takes a deep copy of `value`.
    ///
    /// Returns [RuntimeError::Capture] if the value's [Serialize]
    /// implementation fails (e.g., a map with non-string keys), or if the
    /// value cannot be restored exactly. The latter includes non-finite
    /// floats (NaN and infinities) and a `Some` of anything that serializes
    /// as null, such as `Some(None)` or `Some(())`, which would otherwise
    /// come back as `None`.
    ///
    /// ```
    /// use deferred_call::runtime::{RuntimeError, Snapshot};
    ///
    /// assert!(matches!(
    ///     Snapshot::capture(&f64::NAN),
    ///     Err(RuntimeError::Capture { .. }),
    /// ));
    /// ```
    pub fn capture<T: Serialize + ?Sized>(value: &T) -> RuntimeResult<Self> {
        let result = Lossless::check(value).and_then(|()| serde_json::to_value(value));

        match result {
            Ok(value) => Ok(Self(value)),
            Err(error) => Err(RuntimeError::Capture {
                cause: Arc::new(error),
            }),
        }
    }

    /// Reconstructs an owned value of type `T` from this Snapshot.
    ///
    /// The Snapshot itself stays intact, so the same Snapshot can be
    /// restored any number of times.
    #[inline(always)]
    pub fn restore<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.0)
    }

    /// Returns true if this is a [null](Self::null) Snapshot.
    #[inline(always)]
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Returns the underlying JSON representation.
    #[inline(always)]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// A list of serializable values that can be captured as positional
/// arguments.
///
/// This trait is implemented for tuples of up to eight [Serialize] elements
/// and for the unit type.
///
/// ```
/// use deferred_call::runtime::CaptureArgs;
///
/// let captured = (1, "two", [3.0]).capture().unwrap();
///
/// assert_eq!(captured.len(), 3);
/// assert_eq!(captured[1].restore::<String>().unwrap(), "two");
/// ```
pub trait CaptureArgs {
    /// Captures each element into a separate [Snapshot].
    fn capture(&self) -> RuntimeResult<Vec<Snapshot>>;
}

macro_rules! impl_capture_args {
    ($($index:tt: $ty:ident),*) => {
        impl<$($ty: Serialize,)*> CaptureArgs for ($($ty,)*) {
            #[allow(unused_mut)]
            fn capture(&self) -> RuntimeResult<Vec<Snapshot>> {
                let mut captured = Vec::new();

                $(
                    captured.push(Snapshot::capture(&self.$index)?);
                )*

                Ok(captured)
            }
        }
    };
}

impl_capture_args!();
impl_capture_args!(0: A1);
impl_capture_args!(0: A1, 1: A2);
impl_capture_args!(0: A1, 1: A2, 2: A3);
impl_capture_args!(0: A1, 1: A2, 2: A3, 3: A4);
impl_capture_args!(0: A1, 1: A2, 2: A3, 3: A4, 4: A5);
impl_capture_args!(0: A1, 1: A2, 2: A3, 3: A4, 4: A5, 5: A6);
impl_capture_args!(0: A1, 1: A2, 2: A3, 3: A4, 4: A5, 5: A6, 6: A7);
impl_capture_args!(0: A1, 1: A2, 2: A3, 3: A4, 4: A5, 5: A6, 6: A7, 7: A8);

/// A set of captured positional and keyword arguments.
///
/// Every value is captured as a [Snapshot] at the moment it is added, so
/// later mutations of the caller's objects do not affect the arguments.
///
/// ```
/// use deferred_call::runtime::Arguments;
///
/// let arguments = Arguments::new()
///     .arg(&1)
///     .unwrap()
///     .kwarg("scale", &2.5)
///     .unwrap();
///
/// assert_eq!(arguments.positional().len(), 1);
/// assert_eq!(arguments.keywords()["scale"].restore::<f64>().unwrap(), 2.5);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Arguments {
    positional: Vec<Snapshot>,
    keywords: Keywords,
}

impl Arguments {
    /// Creates an empty set of arguments.
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set of positional arguments from a tuple of serializable
    /// values.
    #[inline]
    pub fn capture(args: impl CaptureArgs) -> RuntimeResult<Self> {
        Ok(Self {
            positional: args.capture()?,
            keywords: Keywords::new(),
        })
    }

    /// Captures `value` as the next positional argument.
    #[inline]
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> RuntimeResult<Self> {
        self.positional.push(Snapshot::capture(value)?);

        Ok(self)
    }

    /// Captures `value` as a keyword argument named `name`.
    ///
    /// A keyword added twice keeps the latest value.
    #[inline]
    pub fn kwarg<T: Serialize + ?Sized>(
        mut self,
        name: impl Into<CompactString>,
        value: &T,
    ) -> RuntimeResult<Self> {
        let _ = self.keywords.insert(name.into(), Snapshot::capture(value)?);

        Ok(self)
    }

    /// Returns the captured positional arguments in order.
    #[inline(always)]
    pub fn positional(&self) -> &[Snapshot] {
        &self.positional
    }

    /// Returns the captured keyword arguments.
    #[inline(always)]
    pub fn keywords(&self) -> &Keywords {
        &self.keywords
    }

    #[inline(always)]
    pub(crate) fn into_parts(self) -> (Vec<Snapshot>, Keywords) {
        (self.positional, self.keywords)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use crate::runtime::{Arguments, CaptureArgs, RuntimeError, Snapshot};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Ledger {
        owner: String,
        entries: Vec<i64>,
    }

    #[test]
    fn test_snapshot_independence() {
        let mut ledger = Ledger {
            owner: String::from("alice"),
            entries: vec![10, 20],
        };

        let snapshot = Snapshot::capture(&ledger).unwrap();

        ledger.owner.push_str("-changed");
        ledger.entries.clear();

        let restored = snapshot.restore::<Ledger>().unwrap();

        assert_eq!(restored.owner, "alice");
        assert_eq!(restored.entries, vec![10, 20]);
        assert_eq!(snapshot.restore::<Ledger>().unwrap(), restored);
    }

    #[test]
    fn test_uncapturable_value() {
        let mut map = HashMap::new();
        let _ = map.insert((1, 2), "tuple keys have no JSON form");

        let Err(error) = Snapshot::capture(&map) else {
            panic!("Capture should fail.");
        };

        assert!(matches!(error, RuntimeError::Capture { .. }));
    }

    #[test]
    fn test_inexact_values_rejected() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                Snapshot::capture(&value),
                Err(RuntimeError::Capture { .. }),
            ));
        }

        assert!(matches!(
            Snapshot::capture(&Some(None::<i32>)),
            Err(RuntimeError::Capture { .. }),
        ));
        assert!(matches!(
            (1, Some(Some(f32::NAN))).capture(),
            Err(RuntimeError::Capture { .. }),
        ));

        let nested = Snapshot::capture(&Some(Some(7))).unwrap();

        assert_eq!(nested.restore::<Option<Option<i32>>>().unwrap(), Some(Some(7)));
        assert_eq!(
            Snapshot::capture(&None::<Option<i32>>)
                .unwrap()
                .restore::<Option<Option<i32>>>()
                .unwrap(),
            None,
        );
    }

    #[test]
    fn test_capture_args() {
        assert!(().capture().unwrap().is_empty());

        let captured = (5u8, Some("x"), vec![true]).capture().unwrap();

        assert_eq!(captured.len(), 3);
        assert_eq!(captured[0].restore::<u8>().unwrap(), 5);
        assert_eq!(captured[1].restore::<Option<String>>().unwrap(), Some(String::from("x")));
        assert_eq!(captured[2].restore::<Vec<bool>>().unwrap(), vec![true]);
    }

    #[test]
    fn test_arguments_builder() {
        let arguments = Arguments::capture((1, 2))
            .unwrap()
            .kwarg("c", &3)
            .unwrap()
            .kwarg("c", &4)
            .unwrap();

        assert_eq!(arguments.positional().len(), 2);
        assert_eq!(arguments.keywords().len(), 1);
        assert_eq!(arguments.keywords()["c"].restore::<i32>().unwrap(), 4);
        assert!(Snapshot::null().is_null());
    }
}
