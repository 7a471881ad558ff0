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


//! # Deferred Call
//!
//! Deferred Call captures method and function invocations as plain data,
//! which can be stored, transmitted, and executed later, possibly in a
//! different process.
//!
//! The library consists of two cooperating parts:
//!
//! - A [SymbolReference](runtime::SymbolReference) names a callable by its
//!   module, an optional owner type, the member name, and an optional
//!   attribute one level below the member. It resolves the name to the actual
//!   [Callable](runtime::Callable) lazily, on first use, through the
//!   [Registry](runtime::Registry).
//! - An [Invocation](runtime::Invocation) pairs a reference with a snapshot
//!   of the call arguments. Running an Invocation executes the target and
//!   stores the result.
//!
//! Both types serialize with [serde], and the captured values (the receiver
//! and the arguments) are deep copies taken at capture time.
//!
//! ```
//! use deferred_call::runtime::{defer_method, Invocation, Registry};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Calc {
//!     x: i64,
//! }
//!
//! impl Calc {
//!     fn calc(&self, other: i64) -> i64 {
//!         self.x * self.x + other * other
//!     }
//! }
//!
//! let mut calc = Calc { x: 5 };
//!
//! let invocation = defer_method(&calc, Calc::calc, (1,)).unwrap();
//!
//! calc.x = 99;
//!
//! // The Invocation can be sent somewhere else as a string.
//! let encoded = serde_json::to_string(&invocation).unwrap();
//!
//! let registry = Registry::new();
//!
//! registry.module(invocation.target().module().to_string(), |module| {
//!     module.owner("Calc").method("calc", Calc::calc);
//!     Ok(())
//! });
//!
//! let mut decoded = serde_json::from_str::<Invocation>(&encoded).unwrap();
//!
//! decoded.run_in(&registry).unwrap();
//!
//! assert_eq!(decoded.result_as::<i64>().unwrap(), 26);
//! ```
//!
//! ## Logging
//!
//! The crate reports module loading and symbol resolution through the [log]
//! facade under the `deferred-call::$registry` and `deferred-call::$resolve`
//! targets. The crate does not install a logger.
//!
//! ## Copyright
//!
//! This work is proprietary software with source-available code.
//!
//! To copy, use, distribute, or contribute to this work, you must agree to the
//! terms and conditions of the
//! [General License Agreement](https://github.com/Eliah-Lakhin/ad-astra/blob/master/EULA.md).
//!
//! Copyright (c) 2024 Ilya Lakhin (Илья Александрович Лахин). All rights reserved.

/// Symbol references, deferred invocations, and the module registry.
pub mod runtime;
