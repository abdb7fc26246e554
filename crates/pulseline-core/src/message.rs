//! Message model and the composition function.
//!
//! Composition is the pure heart of the engine: it resolves an address
//! sequence and an ordered parameter mapping against an optional iteration
//! index into one concrete [`ResolvedMessage`]. It reads nothing and writes
//! nothing beyond its inputs, so identical inputs always produce an
//! identical message.

use crate::error::ComposeError;
use crate::pattern::PatternItem;

/// A named parameter value: a fixed scalar or a pattern sequence.
///
/// Pattern sequences are produced once by the parser and never mutated.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Scalar(f64),
    Pattern(Vec<PatternItem>),
}

impl ParamValue {
    /// True for a pattern that parsed to no elements.
    pub fn is_empty_pattern(&self) -> bool {
        matches!(self, ParamValue::Pattern(items) if items.is_empty())
    }
}

/// The final destination-plus-arguments payload for one dispatch.
///
/// Produced fresh per dispatch and consumed immediately by the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedMessage {
    pub destination: String,
    pub args: Vec<f64>,
}

/// Cyclic selection used by iterator-mode dispatch.
///
/// A remainder of 0 selects the last element; a remainder of m selects
/// element m - 1. See DESIGN.md before changing this rule.
fn wrap_index(i: usize, len: usize) -> usize {
    let m = i % len;
    if m == 0 {
        len - 1
    } else {
        m - 1
    }
}

/// Resolve an address sequence and parameter mapping into one message.
///
/// Without an iteration index, the destination is the first address and
/// every pattern parameter contributes its first element. With an index
/// `i`, the destination and each pattern parameter are selected cyclically
/// by [`wrap_index`]. Scalars pass through either way.
///
/// Argument order exactly matches parameter insertion order. An empty
/// pattern parameter is omitted entirely — never rendered as 0. An empty
/// address sequence means there is nothing to deliver: `Ok(None)`.
pub fn compose(
    addresses: &[String],
    params: &[(String, ParamValue)],
    iter: Option<usize>,
) -> Result<Option<ResolvedMessage>, ComposeError> {
    if addresses.is_empty() {
        return Ok(None);
    }

    let destination = match iter {
        None => addresses[0].clone(),
        Some(i) => addresses[wrap_index(i, addresses.len())].clone(),
    };

    let mut args = Vec::with_capacity(params.len());
    for (name, value) in params {
        match value {
            ParamValue::Scalar(n) => args.push(*n),
            ParamValue::Pattern(items) => {
                if items.is_empty() {
                    continue;
                }
                let item = match iter {
                    None => &items[0],
                    Some(i) => &items[wrap_index(i, items.len())],
                };
                let n = item.as_f64().ok_or_else(|| ComposeError::ValueConversion {
                    param: name.clone(),
                    token: item.token(),
                })?;
                args.push(n);
            }
        }
    }

    Ok(Some(ResolvedMessage { destination, args }))
}
