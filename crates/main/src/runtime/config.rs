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

/// A configuration object of the [Registry](crate::runtime::Registry).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[non_exhaustive]
pub struct RegistryConfig {
    /// If set to true, symbol lookup errors include the name of a declared
    /// module, type, or member that is similar to the requested one.
    ///
    /// The default value is true.
    pub suggestions: bool,

    /// The minimal similarity, in percent, between the requested name and a
    /// declared name for the latter to be suggested.
    ///
    /// The similarity is measured with the normalized Damerau-Levenshtein
    /// distance. Values greater than 100 disable suggestions.
    ///
    /// The default value is 70.
    pub suggestion_closeness: u16,
}

impl Default for RegistryConfig {
    #[inline(always)]
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryConfig {
    /// The default constructor for this configuration object.
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            suggestions: true,
            suggestion_closeness: 70,
        }
    }

    /// A constructor that disables all suggestions.
    #[inline(always)]
    pub const fn quiet() -> Self {
        Self {
            suggestions: false,
            ..Self::new()
        }
    }
}
