//! Binary tries over address bits with longest-prefix-match lookup.

use crate::types::CustomerId;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PrefixParseError {
    #[error("'{0}' is neither an IPv4 nor an IPv6 prefix")]
    UnknownFamily(String),

    #[error("invalid address in prefix '{0}'")]
    Address(String),

    #[error("invalid prefix length in '{0}'")]
    Length(String),

    #[error("prefix length {len} exceeds {max} bits in '{prefix}'")]
    LengthOutOfRange { prefix: String, len: u32, max: u32 },
}

struct TrieNode<T> {
    value: Option<T>,
    children: [Option<Box<TrieNode<T>>>; 2],
}

impl<T> TrieNode<T> {
    fn new() -> Self {
        Self {
            value: None,
            children: [None, None],
        }
    }
}

fn bit_at(key: &[u8], index: usize) -> usize {
    ((key[index / 8] >> (7 - index % 8)) & 1) as usize
}

/// A binary trie keyed by the leading bits of a big-endian byte string.
pub struct PrefixTrie<T> {
    root: TrieNode<T>,
    len: usize,
}

impl<T> Default for PrefixTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PrefixTrie<T> {
    pub fn new() -> Self {
        Self {
            root: TrieNode::new(),
            len: 0,
        }
    }

    /// Associate the first `prefix_len` bits of `key` with `value`, returning
    /// the value previously stored for exactly that prefix.
    ///
    /// `prefix_len` must not exceed `key.len() * 8`.
    pub fn insert(&mut self, key: &[u8], prefix_len: usize, value: T) -> Option<T> {
        debug_assert!(prefix_len <= key.len() * 8);
        let mut node = &mut self.root;
        for index in 0..prefix_len {
            node = &mut **node.children[bit_at(key, index)]
                .get_or_insert_with(|| Box::new(TrieNode::new()));
        }
        let previous = node.value.replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Value of the longest stored prefix covering `key`.
    pub fn lookup(&self, key: &[u8]) -> Option<&T> {
        let mut node = &self.root;
        let mut best = node.value.as_ref();
        for index in 0..key.len() * 8 {
            match &node.children[bit_at(key, index)] {
                Some(child) => {
                    node = &**child;
                    if node.value.is_some() {
                        best = node.value.as_ref();
                    }
                }
                None => break,
            }
        }
        best
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Customer ids by prefix, one trie per address family.
#[derive(Default)]
pub struct PrefixTable {
    v4: PrefixTrie<CustomerId>,
    v6: PrefixTrie<CustomerId>,
}

impl PrefixTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a textual prefix such as `10.0.0.0/8` or `2001:db8::/32`; an
    /// address without a length is a host route.
    ///
    /// The family is chosen by whichever of `.` or `:` occurs first in the text.
    pub fn insert(&mut self, prefix: &str, customer_id: CustomerId) -> Result<(), PrefixParseError> {
        let (address, length) = match prefix.split_once('/') {
            Some((address, length)) => (address, Some(length)),
            None => (prefix, None),
        };

        match prefix.chars().find(|c| *c == '.' || *c == ':') {
            Some('.') => {
                let address: Ipv4Addr = address
                    .parse()
                    .map_err(|_| PrefixParseError::Address(prefix.to_string()))?;
                let len = parse_length(prefix, length, 32)?;
                self.v4.insert(&address.octets(), len, customer_id);
            }
            Some(_) => {
                let address: Ipv6Addr = address
                    .parse()
                    .map_err(|_| PrefixParseError::Address(prefix.to_string()))?;
                let len = parse_length(prefix, length, 128)?;
                self.v6.insert(&address.octets(), len, customer_id);
            }
            None => return Err(PrefixParseError::UnknownFamily(prefix.to_string())),
        }
        Ok(())
    }

    /// Longest-prefix match for `address`. IPv4-mapped IPv6 addresses are
    /// looked up among the IPv4 prefixes.
    pub fn lookup(&self, address: IpAddr) -> Option<CustomerId> {
        match address {
            IpAddr::V4(v4) => self.v4.lookup(&v4.octets()).copied(),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => self.v4.lookup(&v4.octets()).copied(),
                None => self.v6.lookup(&v6.octets()).copied(),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_length(prefix: &str, length: Option<&str>, max: u32) -> Result<usize, PrefixParseError> {
    let len = match length {
        Some(text) => text
            .trim()
            .parse::<u32>()
            .map_err(|_| PrefixParseError::Length(prefix.to_string()))?,
        None => max,
    };
    if len > max {
        return Err(PrefixParseError::LengthOutOfRange {
            prefix: prefix.to_string(),
            len,
            max,
        });
    }
    Ok(len as usize)
}
