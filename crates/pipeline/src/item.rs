// SPDX-License-Identifier: Apache-2.0

//! Pipeline items, the end-of-stream sentinel, and the transform seam.

use crate::error::Error;

/// One unit of pipeline work. Owned by exactly one stage at a time: the
/// reader creates items, the writer consumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    /// Stable item identity, carried through both transforms.
    pub key: u64,
    /// The payload both transform stages rewrite.
    pub value: u64,
    /// Operation selector for the transforms.
    pub opcode: u8,
}

impl Item {
    /// Parses an input line of the form `key value [opcode]`.
    pub fn parse_line(line: &str, line_number: u64) -> Result<Self, Error> {
        let mut fields = line.split_whitespace();
        let parse = |field: Option<&str>, what: &str| -> Result<u64, Error> {
            let text = field.ok_or_else(|| Error::Parse {
                line: line_number,
                details: format!("missing {what}"),
            })?;
            text.parse::<u64>().map_err(|e| Error::Parse {
                line: line_number,
                details: format!("bad {what} '{text}': {e}"),
            })
        };
        let key = parse(fields.next(), "key")?;
        let value = parse(fields.next(), "value")?;
        let opcode = match fields.next() {
            None => b'+',
            Some(op) if op.len() == 1 && op.is_ascii() => op.as_bytes()[0],
            Some(op) => {
                return Err(Error::Parse {
                    line: line_number,
                    details: format!("bad opcode '{op}'"),
                });
            }
        };
        Ok(Item { key, value, opcode })
    }

    /// Formats the item as an output line, `key value`.
    pub fn to_output_line(&self) -> String {
        format!("{} {}", self.key, self.value)
    }
}

/// What flows through the pipeline queues: a work item or the in-band
/// end-of-stream sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// A unit of work.
    Item(Item),
    /// End of stream.
    Eos,
}

/// The two-stage byte transform the pipeline applies. The concrete
/// function is external to the pipeline; implementations must be safe to
/// call from several worker threads at once.
pub trait Transform: Send + Sync {
    /// The transform applied by the producer pool.
    fn producer_stage(&self, item: Item) -> Item;

    /// The transform applied by the consumer pool.
    fn consumer_stage(&self, item: Item) -> Item;
}

/// A deterministic arithmetic transform so runs are verifiable end to
/// end.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTransform;

impl Transform for DefaultTransform {
    fn producer_stage(&self, item: Item) -> Item {
        Item {
            value: item
                .value
                .wrapping_mul(2)
                .wrapping_add(u64::from(item.opcode)),
            ..item
        }
    }

    fn consumer_stage(&self, item: Item) -> Item {
        Item {
            value: item.value.rotate_left(3) ^ item.key,
            ..item
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_defaults_opcode() {
        let item = Item::parse_line("7 1000", 1).unwrap();
        assert_eq!(item, Item { key: 7, value: 1000, opcode: b'+' });
    }

    #[test]
    fn test_parse_line_with_opcode() {
        let item = Item::parse_line("1 2 *", 1).unwrap();
        assert_eq!(item.opcode, b'*');
    }

    #[test]
    fn test_parse_line_errors() {
        assert!(matches!(
            Item::parse_line("", 3),
            Err(Error::Parse { line: 3, .. })
        ));
        assert!(matches!(Item::parse_line("1", 4), Err(Error::Parse { .. })));
        assert!(matches!(
            Item::parse_line("1 x", 5),
            Err(Error::Parse { .. })
        ));
        assert!(matches!(
            Item::parse_line("1 2 xx", 6),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_default_transform_is_deterministic() {
        let item = Item { key: 9, value: 40, opcode: b'+' };
        let t = DefaultTransform;
        let once = t.consumer_stage(t.producer_stage(item));
        let twice = t.consumer_stage(t.producer_stage(item));
        assert_eq!(once, twice);
        assert_eq!(once.key, 9);
    }
}
