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
    fmt::{Display, Formatter},
    result::Result as StdResult,
    sync::Arc,
};

use compact_str::CompactString;

/// A result of a runtime API call, which can either be a normal value or a
/// [RuntimeError].
pub type RuntimeResult<T> = StdResult<T, RuntimeError>;

/// A boxed error returned by a [module loader](crate::runtime::Registry::module)
/// or by a fallible callable.
pub type BoxedError = Box<dyn StdError + Send + Sync + 'static>;

/// Represents any error that may occur while capturing, resolving, or running
/// a deferred call.
///
/// The four lookup variants ([ModuleNotFound](Self::ModuleNotFound),
/// [OwnerTypeNotFound](Self::OwnerTypeNotFound),
/// [MemberNotFound](Self::MemberNotFound), and
/// [AttributeNotFound](Self::AttributeNotFound)) correspond to the four
/// steps of symbol resolution. None of them are retried internally, and none
/// of them poison the [SymbolReference](crate::runtime::SymbolReference) that
/// produced them: the next attempt performs the lookup again.
///
/// A failure of the called function itself is reported as
/// [Target](Self::Target), which keeps the original error object. Use
/// [RuntimeError::target_cause] to inspect it.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum RuntimeError {
    /// The module cannot be loaded in the current environment: either it was
    /// never declared in the registry, or its loader failed.
    ModuleNotFound {
        /// The requested module path.
        module: CompactString,

        /// The loader's failure, if the module was declared but did not load.
        cause: Option<Arc<dyn StdError + Send + Sync + 'static>>,

        /// A declared module with a similar name, if any.
        suggestion: Option<CompactString>,
    },

    /// The owner type is not declared in the loaded module.
    OwnerTypeNotFound {
        /// The module where the type was looked up.
        module: CompactString,

        /// The requested owner type name.
        owner: CompactString,

        /// A declared type with a similar name, if any.
        suggestion: Option<CompactString>,
    },

    /// The member is not declared in the module (or in the owner type, if the
    /// reference has one), or the member is a container without its own entry
    /// point.
    MemberNotFound {
        /// The module where the member was looked up.
        module: CompactString,

        /// The owner type where the member was looked up, if any.
        owner: Option<CompactString>,

        /// The requested member name.
        member: CompactString,

        /// A declared member with a similar name, if any.
        suggestion: Option<CompactString>,
    },

    /// The attribute is missing on the resolved member.
    AttributeNotFound {
        /// The module of the resolved member.
        module: CompactString,

        /// The owner type of the resolved member, if any.
        owner: Option<CompactString>,

        /// The resolved member's name.
        member: CompactString,

        /// The requested attribute name.
        attribute: CompactString,
    },

    /// The result of an [Invocation](crate::runtime::Invocation) was requested
    /// before any successful run.
    ResultNotAvailable,

    /// The called function failed. The original error is preserved as is.
    Target {
        /// The error returned by the function.
        cause: Arc<dyn StdError + Send + Sync + 'static>,
    },

    /// The callable has no stable importable name (e.g., it is a closure, a
    /// function pointer, or a generic instantiation).
    Anonymous {
        /// The type name of the rejected callable.
        name: CompactString,
    },

    /// A value could not be captured into a [Snapshot](crate::runtime::Snapshot).
    Capture {
        /// The serialization error.
        cause: Arc<serde_json::Error>,
    },

    /// The function received more positional arguments than it has
    /// parameters.
    ArityMismatch {
        /// The name of the called function.
        function: CompactString,

        /// The number of function parameters.
        parameters: usize,

        /// The number of positional arguments.
        arguments: usize,
    },

    /// A function parameter received neither a positional nor a keyword
    /// argument.
    MissingArgument {
        /// The name of the called function.
        function: CompactString,

        /// The parameter's name, or its index if the parameters are unnamed.
        parameter: CompactString,
    },

    /// A keyword argument does not match any named parameter.
    UnexpectedKeyword {
        /// The name of the called function.
        function: CompactString,

        /// The keyword.
        keyword: CompactString,
    },

    /// A parameter received both a positional and a keyword argument.
    DuplicateArgument {
        /// The name of the called function.
        function: CompactString,

        /// The parameter's name.
        parameter: CompactString,
    },

    /// An argument snapshot cannot be restored into the parameter's type.
    ArgumentMismatch {
        /// The name of the called function.
        function: CompactString,

        /// The zero-based index of the parameter.
        index: usize,

        /// The deserialization error.
        cause: Arc<serde_json::Error>,
    },

    /// A method was called without a receiver, or the receiver snapshot
    /// cannot be restored into the method's receiver type.
    ReceiverMismatch {
        /// The name of the called method.
        function: CompactString,

        /// The deserialization error, if a receiver was present.
        cause: Option<Arc<serde_json::Error>>,
    },

    /// A receiver was supplied to a reference without an owner type.
    UnexpectedReceiver {
        /// The module of the referenced function.
        module: CompactString,

        /// The referenced function's name.
        member: CompactString,
    },
}

impl Display for RuntimeError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ModuleNotFound {
                module,
                cause,
                suggestion,
            } => {
                match cause {
                    None => formatter.write_fmt(format_args!("Module {module:?} not found."))?,
                    Some(cause) => formatter
                        .write_fmt(format_args!("Module {module:?} failed to load. {cause}"))?,
                }

                format_suggestion(formatter, suggestion)
            }

            Self::OwnerTypeNotFound {
                module,
                owner,
                suggestion,
            } => {
                formatter.write_fmt(format_args!(
                    "Type {owner:?} not found in module {module:?}.",
                ))?;

                format_suggestion(formatter, suggestion)
            }

            Self::MemberNotFound {
                module,
                owner,
                member,
                suggestion,
            } => {
                match owner {
                    None => formatter.write_fmt(format_args!(
                        "Member {member:?} not found in module {module:?}.",
                    ))?,

                    Some(owner) => formatter.write_fmt(format_args!(
                        "Member {member:?} not found in type {module}::{owner}.",
                    ))?,
                }

                format_suggestion(formatter, suggestion)
            }

            Self::AttributeNotFound {
                module,
                owner,
                member,
                attribute,
            } => match owner {
                None => formatter.write_fmt(format_args!(
                    "Attribute {attribute:?} not found on {module}::{member}.",
                )),

                Some(owner) => formatter.write_fmt(format_args!(
                    "Attribute {attribute:?} not found on {module}::{owner}::{member}.",
                )),
            },

            Self::ResultNotAvailable => {
                formatter.write_str("The invocation has not been run successfully yet.")
            }

            Self::Target { cause } => Display::fmt(cause, formatter),

            Self::Anonymous { name } => formatter.write_fmt(format_args!(
                "Callable {name:?} has no stable importable name.",
            )),

            Self::Capture { cause } => {
                formatter.write_fmt(format_args!("Value capture failed. {cause}"))
            }

            Self::ArityMismatch {
                function,
                parameters,
                arguments,
            } => formatter.write_fmt(format_args!(
                "Function {function:?} takes {parameters} parameter(s), but {arguments} \
                positional argument(s) were given.",
            )),

            Self::MissingArgument {
                function,
                parameter,
            } => formatter.write_fmt(format_args!(
                "Function {function:?} is missing argument {parameter:?}.",
            )),

            Self::UnexpectedKeyword { function, keyword } => formatter.write_fmt(format_args!(
                "Function {function:?} has no parameter named {keyword:?}.",
            )),

            Self::DuplicateArgument {
                function,
                parameter,
            } => formatter.write_fmt(format_args!(
                "Function {function:?} received parameter {parameter:?} both \
                positionally and by keyword.",
            )),

            Self::ArgumentMismatch {
                function,
                index,
                cause,
            } => formatter.write_fmt(format_args!(
                "Argument #{index} of function {function:?} has incompatible type. {cause}",
            )),

            Self::ReceiverMismatch { function, cause } => match cause {
                None => formatter
                    .write_fmt(format_args!("Method {function:?} requires a receiver.")),

                Some(cause) => formatter.write_fmt(format_args!(
                    "Receiver of method {function:?} has incompatible type. {cause}",
                )),
            },

            Self::UnexpectedReceiver { module, member } => formatter.write_fmt(format_args!(
                "Function {module}::{member} has no owner type and cannot take a receiver.",
            )),
        }
    }
}

impl StdError for RuntimeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::ModuleNotFound {
                cause: Some(cause), ..
            } => Some(cause.as_ref()),
            Self::Target { cause } => Some(cause.as_ref()),
            Self::Capture { cause } => Some(cause.as_ref()),
            Self::ArgumentMismatch { cause, .. } => Some(cause.as_ref()),
            Self::ReceiverMismatch {
                cause: Some(cause), ..
            } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl RuntimeError {
    /// Returns true if this error is one of the four symbol lookup failures.
    #[inline]
    pub fn is_lookup(&self) -> bool {
        match self {
            Self::ModuleNotFound { .. }
            | Self::OwnerTypeNotFound { .. }
            | Self::MemberNotFound { .. }
            | Self::AttributeNotFound { .. } => true,
            _ => false,
        }
    }

    /// Returns the original error of the called function if this error is a
    /// [Target](Self::Target) failure.
    ///
    /// The returned object can be downcast to the function's concrete error
    /// type.
    #[inline]
    pub fn target_cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Target { cause } => Some(cause.as_ref()),
            _ => None,
        }
    }

    #[inline(always)]
    pub(crate) fn target(cause: impl StdError + Send + Sync + 'static) -> Self {
        Self::Target {
            cause: Arc::new(cause),
        }
    }
}

fn format_suggestion(
    formatter: &mut Formatter<'_>,
    suggestion: &Option<CompactString>,
) -> std::fmt::Result {
    let Some(suggestion) = suggestion else {
        return Ok(());
    };

    formatter.write_fmt(format_args!(" Did you mean {suggestion:?}?"))
}

#[cfg(test)]
mod tests {
    use std::{error::Error, fmt::Display};

    use crate::runtime::RuntimeError;

    #[derive(Debug)]
    struct Overdraft;

    impl Display for Overdraft {
        fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("overdraft")
        }
    }

    impl Error for Overdraft {}

    #[test]
    fn test_target_cause_downcast() {
        let error = RuntimeError::target(Overdraft);

        assert!(!error.is_lookup());
        assert_eq!(error.to_string(), "overdraft");
        assert!(error.target_cause().unwrap().is::<Overdraft>());
        assert!(error.source().unwrap().is::<Overdraft>());
    }

    #[test]
    fn test_lookup_messages() {
        let error = RuntimeError::MemberNotFound {
            module: "billing".into(),
            owner: Some("Account".into()),
            member: "balanse".into(),
            suggestion: Some("balance".into()),
        };

        assert!(error.is_lookup());
        assert_eq!(
            error.to_string(),
            "Member \"balanse\" not found in type billing::Account. Did you mean \"balance\"?",
        );

        let error = RuntimeError::ModuleNotFound {
            module: "billing".into(),
            cause: None,
            suggestion: None,
        };

        assert_eq!(error.to_string(), "Module \"billing\" not found.");
    }
}
