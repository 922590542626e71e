//! Type descriptors
//!
//! A [`TypeDescriptor`] describes the shape of a type or a parametric type
//! family. Parametric forms follow `name(parameter, parameter, ...)` where
//! each parameter is itself a descriptor, an integer literal or a reference
//! to a variable declared by the enclosing signature

use std::fmt::Display;

use snafu::{Snafu, ensure};

use crate::AHashSet;
use crate::bind::BoundVariables;
use crate::types::LogicalType;

/// Error parsing the textual form of a type descriptor
#[derive(Debug, Snafu)]
pub enum TypeDescriptorError {
    /// The text does not follow the `name(parameter, ...)` grammar
    #[snafu(display("malformed type descriptor `{text}`: {reason} at byte {position}"))]
    Malformed {
        /// The full text that was parsed
        text: String,
        /// Byte offset the parser stopped at
        position: usize,
        /// What the parser expected
        reason: &'static str,
    },
}

/// A descriptor references a variable the supplied bindings do not cover
#[derive(Debug, Snafu)]
#[snafu(display("type descriptor references variable `{name}` with no binding"))]
pub struct UnboundVariableError {
    /// Name of the unbound variable
    pub(crate) name: String,
}

/// One parameter of a parametric type descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptorParameter {
    /// A nested type descriptor, e.g. the `bigint` in `array(bigint)`
    Type(TypeDescriptor),
    /// An integer literal, e.g. the `38` in `decimal(38, 0)`
    Literal(i64),
    /// A reference to a type or long variable declared by the enclosing
    /// signature, e.g. the `p` in `decimal(p, s)`
    Variable(String),
}

impl Display for TypeDescriptorParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Type(descriptor) => write!(f, "{}", descriptor),
            Self::Literal(value) => write!(f, "{}", value),
            Self::Variable(name) => write!(f, "{}", name),
        }
    }
}

/// Immutable description of a type or a parametric type family, possibly
/// referencing variables declared by the enclosing signature
///
/// Equality and hashing are structural over the canonical form: signatures
/// rewrite bare leaf parameters that name a declared variable into explicit
/// [`TypeDescriptorParameter::Variable`] references at construction, so two
/// signatures declaring the same shape compare equal however their
/// descriptors were spelled
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    base: String,
    parameters: Vec<TypeDescriptorParameter>,
}

impl TypeDescriptor {
    /// Create a descriptor of a plain type without parameters. The name can
    /// be a concrete type name or a declared type variable
    pub fn leaf(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            parameters: Vec::new(),
        }
    }

    /// Create a descriptor of a parametric type family
    pub fn parametric(base: impl Into<String>, parameters: Vec<TypeDescriptorParameter>) -> Self {
        Self {
            base: base.into(),
            parameters,
        }
    }

    /// Parse the textual form, e.g. `bigint`, `decimal(p, s)` or
    /// `map(varchar, array(T))`
    pub fn parse(text: &str) -> Result<Self, TypeDescriptorError> {
        let mut parser = Parser { text, pos: 0 };
        let descriptor = parser.descriptor()?;
        parser.skip_whitespace();
        ensure!(
            parser.at_end(),
            MalformedSnafu {
                text,
                position: parser.pos,
                reason: "trailing characters after the descriptor"
            }
        );
        Ok(descriptor)
    }

    /// Base name of the described type or type family
    #[inline]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Nested parameters in declaration order. Empty for plain types
    #[inline]
    pub fn parameters(&self) -> &[TypeDescriptorParameter] {
        &self.parameters
    }

    /// Does any (nested) parameter reference a variable, or is the descriptor
    /// itself a bare leaf (which may name a type variable)?
    pub fn is_concrete(&self) -> bool {
        self.parameters.iter().all(|parameter| match parameter {
            TypeDescriptorParameter::Type(descriptor) => descriptor.is_concrete(),
            TypeDescriptorParameter::Literal(_) => true,
            TypeDescriptorParameter::Variable(_) => false,
        })
    }

    /// Replace every variable reference with its bound value, yielding a
    /// variable-free descriptor a type registry can resolve
    ///
    /// A bare leaf whose base names a bound type variable is replaced as a
    /// whole; a leaf naming neither a binding nor a concrete type passes
    /// through unchanged and is left for the registry to reject
    pub fn substitute(&self, bindings: &BoundVariables) -> Result<Self, UnboundVariableError> {
        if self.parameters.is_empty() {
            if let Some(bound) = bindings.type_variable(&self.base) {
                return Ok(Self::from(bound));
            }
        }

        let parameters = self
            .parameters
            .iter()
            .map(|parameter| match parameter {
                TypeDescriptorParameter::Type(descriptor) => Ok(TypeDescriptorParameter::Type(
                    descriptor.substitute(bindings)?,
                )),
                TypeDescriptorParameter::Literal(value) => {
                    Ok(TypeDescriptorParameter::Literal(*value))
                }
                TypeDescriptorParameter::Variable(name) => {
                    if let Some(value) = bindings.long_variable(name) {
                        Ok(TypeDescriptorParameter::Literal(value))
                    } else if let Some(bound) = bindings.type_variable(name) {
                        Ok(TypeDescriptorParameter::Type(Self::from(bound)))
                    } else {
                        UnboundVariableSnafu { name }.fail()
                    }
                }
            })
            .collect::<Result<Vec<_>, UnboundVariableError>>()?;

        Ok(Self {
            base: self.base.clone(),
            parameters,
        })
    }

    /// Rewrite bare leaf parameters whose base names a declared variable into
    /// explicit variable references. Called once at signature construction
    pub(crate) fn canonicalize(self, declared: &AHashSet<String>) -> Self {
        let parameters = self
            .parameters
            .into_iter()
            .map(|parameter| match parameter {
                TypeDescriptorParameter::Type(descriptor) => {
                    if descriptor.parameters.is_empty() && declared.contains(&descriptor.base) {
                        TypeDescriptorParameter::Variable(descriptor.base)
                    } else {
                        TypeDescriptorParameter::Type(descriptor.canonicalize(declared))
                    }
                }
                other => other,
            })
            .collect();

        Self {
            base: self.base,
            parameters,
        }
    }

    /// First explicit variable reference that does not name a declared
    /// variable, if any. Walked in declaration order
    pub(crate) fn find_undeclared(&self, declared: &AHashSet<String>) -> Option<&str> {
        self.parameters.iter().find_map(|parameter| match parameter {
            TypeDescriptorParameter::Type(descriptor) => descriptor.find_undeclared(declared),
            TypeDescriptorParameter::Literal(_) => None,
            TypeDescriptorParameter::Variable(name) => {
                (!declared.contains(name)).then_some(name.as_str())
            }
        })
    }
}

impl Display for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.base)?;
        let mut parameters = self.parameters.iter();
        if let Some(first) = parameters.next() {
            write!(f, "({}", first)?;
            for parameter in parameters {
                write!(f, ", {}", parameter)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl From<&LogicalType> for TypeDescriptor {
    fn from(logical_type: &LogicalType) -> Self {
        match logical_type {
            LogicalType::Decimal { precision, scale } => Self::parametric(
                "decimal",
                vec![
                    TypeDescriptorParameter::Literal(*precision as i64),
                    TypeDescriptorParameter::Literal(*scale as i64),
                ],
            ),
            other => Self::leaf(other.to_string()),
        }
    }
}

/// Recursive descent parser over the `name(parameter, ...)` grammar
struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn skip_whitespace(&mut self) {
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    #[inline]
    fn at_end(&self) -> bool {
        self.pos == self.text.len()
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn malformed<T>(&self, reason: &'static str) -> Result<T, TypeDescriptorError> {
        MalformedSnafu {
            text: self.text,
            position: self.pos,
            reason,
        }
        .fail()
    }

    fn identifier(&mut self) -> Result<&str, TypeDescriptorError> {
        let bytes = self.text.as_bytes();
        let start = self.pos;
        match bytes.get(start) {
            Some(byte) if byte.is_ascii_alphabetic() || *byte == b'_' => {}
            _ => return self.malformed("expected an identifier"),
        }
        self.pos += 1;
        while self.pos < bytes.len()
            && (bytes[self.pos].is_ascii_alphanumeric() || bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }
        Ok(&self.text[start..self.pos])
    }

    fn literal(&mut self) -> Result<i64, TypeDescriptorError> {
        let bytes = self.text.as_bytes();
        let start = self.pos;
        if bytes.get(self.pos) == Some(&b'-') {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        if self.pos == digits_start {
            return self.malformed("expected an integer literal");
        }
        match self.text[start..self.pos].parse::<i64>() {
            Ok(value) => Ok(value),
            Err(_) => self.malformed("integer literal out of the i64 range"),
        }
    }

    fn parameter(&mut self) -> Result<TypeDescriptorParameter, TypeDescriptorError> {
        self.skip_whitespace();
        match self.peek() {
            Some(byte) if byte.is_ascii_digit() || byte == b'-' => {
                Ok(TypeDescriptorParameter::Literal(self.literal()?))
            }
            Some(byte) if byte.is_ascii_alphabetic() || byte == b'_' => {
                Ok(TypeDescriptorParameter::Type(self.descriptor()?))
            }
            _ => self.malformed("expected a type descriptor parameter"),
        }
    }

    fn descriptor(&mut self) -> Result<TypeDescriptor, TypeDescriptorError> {
        self.skip_whitespace();
        let base = self.identifier()?.to_string();
        self.skip_whitespace();
        if self.peek() != Some(b'(') {
            return Ok(TypeDescriptor::leaf(base));
        }
        self.pos += 1;

        let mut parameters = Vec::new();
        loop {
            parameters.push(self.parameter()?);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                _ => return self.malformed("expected `,` or `)`"),
            }
        }

        Ok(TypeDescriptor::parametric(base, parameters))
    }
}
