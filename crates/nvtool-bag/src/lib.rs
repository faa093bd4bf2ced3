//! Ordered, unique-key property bags for fault-report fixtures.
//!
//! An [`NvBag`] is an ordered mapping from string keys to typed values.
//! Keys are unique: inserting a key that already exists is an error, never a
//! silent overwrite. Insertion order is preserved and drives every rendering
//! path (`render`), the binary codec (`codec`), and message-template
//! decoding (`msg`).

pub mod codec;
pub mod msg;
pub mod render;

/// A single typed value held by a bag entry.
///
/// Scripts can only add strings through the bridge, but bags loaded from a
/// file may carry any of these, so the codec and renderers handle them all.
#[derive(Debug, Clone, PartialEq)]
pub enum NvValue {
    String(String),
    Bool(bool),
    Int64(i64),
    Uint64(u64),
    Double(f64),
    Bag(NvBag),
}

impl NvValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            NvValue::String(_) => "string",
            NvValue::Bool(_) => "bool",
            NvValue::Int64(_) => "int64",
            NvValue::Uint64(_) => "uint64",
            NvValue::Double(_) => "double",
            NvValue::Bag(_) => "bag",
        }
    }
}

#[derive(Debug)]
pub enum BagError {
    InvalidArgument {
        what: &'static str,
        why: &'static str,
    },
    DuplicateKey {
        key: String,
    },
    Format {
        why: String,
    },
}

impl std::fmt::Display for BagError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BagError::InvalidArgument { what, why } => {
                write!(f, "invalid {what}: {why}")
            }
            BagError::DuplicateKey { key } => {
                write!(f, "duplicate key {key:?}")
            }
            BagError::Format { why } => write!(f, "malformed bag encoding: {why}"),
        }
    }
}

impl std::error::Error for BagError {}

/// Ordered key/value store with the unique-name policy always on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NvBag {
    entries: Vec<(String, NvValue)>,
}

impl NvBag {
    /// Empty bag. Allocation happens lazily on first insert; an allocator
    /// failure aborts the process, so construction itself cannot fail.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&NvValue> {
        self.entries
            .iter()
            .find_map(|(k, v)| if k == key { Some(v) } else { None })
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NvValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn add_string(
        &mut self,
        key: &str,
        value: impl Into<String>,
    ) -> Result<(), BagError> {
        let value = value.into();
        if value.contains('\0') {
            return Err(BagError::InvalidArgument {
                what: "value",
                why: "contains NUL",
            });
        }
        self.add_value(key, NvValue::String(value))
    }

    pub fn add_bool(&mut self, key: &str, value: bool) -> Result<(), BagError> {
        self.add_value(key, NvValue::Bool(value))
    }

    pub fn add_int64(&mut self, key: &str, value: i64) -> Result<(), BagError> {
        self.add_value(key, NvValue::Int64(value))
    }

    pub fn add_uint64(&mut self, key: &str, value: u64) -> Result<(), BagError> {
        self.add_value(key, NvValue::Uint64(value))
    }

    pub fn add_double(&mut self, key: &str, value: f64) -> Result<(), BagError> {
        self.add_value(key, NvValue::Double(value))
    }

    pub fn add_bag(&mut self, key: &str, value: NvBag) -> Result<(), BagError> {
        self.add_value(key, NvValue::Bag(value))
    }

    pub(crate) fn add_value(&mut self, key: &str, value: NvValue) -> Result<(), BagError> {
        if key.is_empty() {
            return Err(BagError::InvalidArgument {
                what: "key",
                why: "empty",
            });
        }
        if key.contains('\0') {
            return Err(BagError::InvalidArgument {
                what: "key",
                why: "contains NUL",
            });
        }
        if self.contains_key(key) {
            return Err(BagError::DuplicateKey {
                key: key.to_string(),
            });
        }
        self.entries.push((key.to_string(), value));
        Ok(())
    }

    /// Dotted-path lookup descending through nested bags, e.g. `"de.scheme"`.
    pub fn lookup_path(&self, path: &str) -> Option<&NvValue> {
        let mut bag = self;
        let mut segments = path.split('.').peekable();
        loop {
            let seg = segments.next()?;
            let value = bag.get(seg)?;
            if segments.peek().is_none() {
                return Some(value);
            }
            match value {
                NvValue::Bag(inner) => bag = inner,
                _ => return None,
            }
        }
    }
}
