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

use serde::{
    ser::{
        Error as _,
        SerializeMap,
        SerializeSeq,
        SerializeStruct,
        SerializeStructVariant,
        SerializeTuple,
        SerializeTupleStruct,
        SerializeTupleVariant,
    },
    Serialize,
    Serializer,
};
use serde_json::Error;

// Walks a value's serialization without producing output, and fails on the
// shapes that the JSON value model would silently alter: non-finite floats
// (stored as null) and a `Some` of a value that serializes as null (restored
// as `None`).
pub(super) struct Lossless;

impl Lossless {
    #[inline(always)]
    pub(super) fn check<T: Serialize + ?Sized>(value: &T) -> Result<(), Error> {
        value.serialize(Self)
    }

    #[inline(always)]
    fn float(value: f64) -> Result<(), Error> {
        match value.is_finite() {
            true => Ok(()),
            false => Err(Error::custom(format_args!(
                "non-finite number {value} has no JSON representation",
            ))),
        }
    }
}

impl Serializer for Lossless {
    type Ok = ();
    type Error = Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    #[inline(always)]
    fn serialize_bool(self, _v: bool) -> Result<(), Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_i8(self, _v: i8) -> Result<(), Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_i16(self, _v: i16) -> Result<(), Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_i32(self, _v: i32) -> Result<(), Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_i64(self, _v: i64) -> Result<(), Error> {
        Ok(())
    }

    // Out-of-range values are rejected by serde_json itself.
    #[inline(always)]
    fn serialize_i128(self, _v: i128) -> Result<(), Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_u8(self, _v: u8) -> Result<(), Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_u16(self, _v: u16) -> Result<(), Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_u32(self, _v: u32) -> Result<(), Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_u64(self, _v: u64) -> Result<(), Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_u128(self, _v: u128) -> Result<(), Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_f32(self, v: f32) -> Result<(), Error> {
        Self::float(f64::from(v))
    }

    #[inline(always)]
    fn serialize_f64(self, v: f64) -> Result<(), Error> {
        Self::float(v)
    }

    #[inline(always)]
    fn serialize_char(self, _v: char) -> Result<(), Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_str(self, _v: &str) -> Result<(), Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_bytes(self, _v: &[u8]) -> Result<(), Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_none(self) -> Result<(), Error> {
        Ok(())
    }

    fn serialize_some<T>(self, value: &T) -> Result<(), Error>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(Self)?;

        if serde_json::to_value(value)?.is_null() {
            return Err(Error::custom(
                "Some of a value that serializes as null would be restored as None",
            ));
        }

        Ok(())
    }

    #[inline(always)]
    fn serialize_unit(self) -> Result<(), Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<(), Error> {
        Ok(())
    }

    #[inline(always)]
    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<(), Error>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(Self)
    }

    #[inline(always)]
    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<(), Error>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(Self)
    }

    #[inline(always)]
    fn serialize_seq(self, _len: Option<usize>) -> Result<Self, Error> {
        Ok(Self)
    }

    #[inline(always)]
    fn serialize_tuple(self, _len: usize) -> Result<Self, Error> {
        Ok(Self)
    }

    #[inline(always)]
    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Self, Error> {
        Ok(Self)
    }

    #[inline(always)]
    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, Error> {
        Ok(Self)
    }

    #[inline(always)]
    fn serialize_map(self, _len: Option<usize>) -> Result<Self, Error> {
        Ok(Self)
    }

    #[inline(always)]
    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self, Error> {
        Ok(Self)
    }

    #[inline(always)]
    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, Error> {
        Ok(Self)
    }
}

impl SerializeSeq for Lossless {
    type Ok = ();
    type Error = Error;

    #[inline(always)]
    fn serialize_element<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(Self)
    }

    #[inline(always)]
    fn end(self) -> Result<(), Error> {
        Ok(())
    }
}

impl SerializeTuple for Lossless {
    type Ok = ();
    type Error = Error;

    #[inline(always)]
    fn serialize_element<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(Self)
    }

    #[inline(always)]
    fn end(self) -> Result<(), Error> {
        Ok(())
    }
}

impl SerializeTupleStruct for Lossless {
    type Ok = ();
    type Error = Error;

    #[inline(always)]
    fn serialize_field<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(Self)
    }

    #[inline(always)]
    fn end(self) -> Result<(), Error> {
        Ok(())
    }
}

impl SerializeTupleVariant for Lossless {
    type Ok = ();
    type Error = Error;

    #[inline(always)]
    fn serialize_field<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(Self)
    }

    #[inline(always)]
    fn end(self) -> Result<(), Error> {
        Ok(())
    }
}

impl SerializeMap for Lossless {
    type Ok = ();
    type Error = Error;

    #[inline(always)]
    fn serialize_key<T>(&mut self, key: &T) -> Result<(), Error>
    where
        T: ?Sized + Serialize,
    {
        key.serialize(Self)
    }

    #[inline(always)]
    fn serialize_value<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(Self)
    }

    #[inline(always)]
    fn end(self) -> Result<(), Error> {
        Ok(())
    }
}

impl SerializeStruct for Lossless {
    type Ok = ();
    type Error = Error;

    #[inline(always)]
    fn serialize_field<T>(&mut self, _key: &'static str, value: &T) -> Result<(), Error>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(Self)
    }

    #[inline(always)]
    fn end(self) -> Result<(), Error> {
        Ok(())
    }
}

impl SerializeStructVariant for Lossless {
    type Ok = ();
    type Error = Error;

    #[inline(always)]
    fn serialize_field<T>(&mut self, _key: &'static str, value: &T) -> Result<(), Error>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(Self)
    }

    #[inline(always)]
    fn end(self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::runtime::lossless::Lossless;

    #[test]
    fn test_lossy_shapes() {
        assert!(Lossless::check(&f64::NAN).is_err());
        assert!(Lossless::check(&f32::NEG_INFINITY).is_err());
        assert!(Lossless::check(&vec![1.0, f64::INFINITY]).is_err());
        assert!(Lossless::check(&Some(None::<i32>)).is_err());
        assert!(Lossless::check(&Some(())).is_err());
        assert!(Lossless::check(&BTreeMap::from([("a", Some(Some(f64::NAN)))])).is_err());
    }

    #[test]
    fn test_faithful_shapes() {
        assert!(Lossless::check(&1.5f64).is_ok());
        assert!(Lossless::check(&None::<i32>).is_ok());
        assert!(Lossless::check(&Some(Some(3))).is_ok());
        assert!(Lossless::check(&Some(Vec::<i32>::new())).is_ok());
        assert!(Lossless::check(&(1, "two", [3.0])).is_ok());
    }
}
