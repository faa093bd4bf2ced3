//! Binary (de)serialization of property bags.
//!
//! Self-contained versioned framing:
//!
//! ```text
//! header:  magic  b"NVB1"
//!          flags  u32 LE       bit 0: unique-name policy
//! pairs:   count  u32 LE, then `count` entries
//! entry:   klen   u32 LE, key bytes (UTF-8)
//!          tag    u8
//!          payload per tag; nested bags encode their pairs recursively
//!          without a header
//! ```
//!
//! The decoder is strict: bad magic, truncation, unknown tags, invalid
//! UTF-8, trailing bytes, and duplicate keys under the unique-name flag are
//! all rejected. `from_bytes(to_bytes(bag))` reproduces an equivalent bag
//! (same keys, types, values, order).

use crate::{BagError, NvBag, NvValue};

pub const NVB_MAGIC: [u8; 4] = *b"NVB1";
pub const NVB_FLAG_UNIQUE_NAME: u32 = 0x1;

const TAG_STRING: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_INT64: u8 = 3;
const TAG_UINT64: u8 = 4;
const TAG_DOUBLE: u8 = 5;
const TAG_BAG: u8 = 6;

/// Decoder recursion limit. The encoder does not enforce one; fixture bags
/// never nest anywhere near this deep.
const MAX_DEPTH: u32 = 64;

pub fn to_bytes(bag: &NvBag) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&NVB_MAGIC);
    out.extend_from_slice(&NVB_FLAG_UNIQUE_NAME.to_le_bytes());
    encode_pairs(bag, &mut out);
    out
}

fn encode_pairs(bag: &NvBag, out: &mut Vec<u8>) {
    out.extend_from_slice(&(bag.len() as u32).to_le_bytes());
    for (key, value) in bag.iter() {
        out.extend_from_slice(&(key.len() as u32).to_le_bytes());
        out.extend_from_slice(key.as_bytes());
        match value {
            NvValue::String(s) => {
                out.push(TAG_STRING);
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            NvValue::Bool(b) => {
                out.push(TAG_BOOL);
                out.push(u8::from(*b));
            }
            NvValue::Int64(n) => {
                out.push(TAG_INT64);
                out.extend_from_slice(&n.to_le_bytes());
            }
            NvValue::Uint64(n) => {
                out.push(TAG_UINT64);
                out.extend_from_slice(&n.to_le_bytes());
            }
            NvValue::Double(d) => {
                out.push(TAG_DOUBLE);
                out.extend_from_slice(&d.to_le_bytes());
            }
            NvValue::Bag(inner) => {
                out.push(TAG_BAG);
                encode_pairs(inner, out);
            }
        }
    }
}

pub fn from_bytes(bytes: &[u8]) -> Result<NvBag, BagError> {
    let mut cur = Cursor::new(bytes);
    let magic = cur.take(4, "magic")?;
    if magic != NVB_MAGIC {
        return Err(format_err("bad magic"));
    }
    let flags = cur.u32("flags")?;
    if flags & !NVB_FLAG_UNIQUE_NAME != 0 {
        return Err(format_err(format!("unsupported flags {flags:#x}")));
    }
    let bag = decode_pairs(&mut cur, 0)?;
    if cur.remaining() != 0 {
        return Err(format_err(format!(
            "{} trailing bytes after last entry",
            cur.remaining()
        )));
    }
    Ok(bag)
}

fn decode_pairs(cur: &mut Cursor<'_>, depth: u32) -> Result<NvBag, BagError> {
    if depth > MAX_DEPTH {
        return Err(format_err("bags nested too deeply"));
    }
    let count = cur.u32("entry count")?;
    let mut bag = NvBag::new();
    for _ in 0..count {
        let key = cur.string("key")?;
        let tag = cur.u8("tag")?;
        let value = match tag {
            TAG_STRING => NvValue::String(cur.string("string value")?),
            TAG_BOOL => match cur.u8("bool value")? {
                0 => NvValue::Bool(false),
                1 => NvValue::Bool(true),
                other => {
                    return Err(format_err(format!("bad bool byte {other}")));
                }
            },
            TAG_INT64 => NvValue::Int64(i64::from_le_bytes(cur.array("int64 value")?)),
            TAG_UINT64 => NvValue::Uint64(u64::from_le_bytes(cur.array("uint64 value")?)),
            TAG_DOUBLE => NvValue::Double(f64::from_le_bytes(cur.array("double value")?)),
            TAG_BAG => NvValue::Bag(decode_pairs(cur, depth + 1)?),
            other => return Err(format_err(format!("unknown value tag {other}"))),
        };
        // A key the bag layer refuses (duplicate, empty, NUL) means the
        // buffer is malformed. The partially built bag is simply dropped;
        // nothing half-constructed escapes this function.
        bag.add_value(&key, value)
            .map_err(|err| format_err(err.to_string()))?;
    }
    Ok(bag)
}

fn format_err(why: impl Into<String>) -> BagError {
    BagError::Format { why: why.into() }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], BagError> {
        if self.remaining() < n {
            return Err(format_err(format!(
                "truncated reading {what}: need {n} bytes, have {}",
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self, what: &str) -> Result<u8, BagError> {
        Ok(self.take(1, what)?[0])
    }

    fn u32(&mut self, what: &str) -> Result<u32, BagError> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N], BagError> {
        let slice = self.take(N, what)?;
        let mut arr = [0u8; N];
        arr.copy_from_slice(slice);
        Ok(arr)
    }

    fn string(&mut self, what: &str) -> Result<String, BagError> {
        let len = self.u32(what)? as usize;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| format_err(format!("{what} is not valid UTF-8")))
    }
}
