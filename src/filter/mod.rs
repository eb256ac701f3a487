//! A small boolean filter language over flow record fields.
//!
//! ```text
//! proto tcp and (dst port 443 or dst port 80) and not src address 10.0.0.0/8
//! bytes > 1000000 or bps >= 1000000000
//! direction ingress and cid 100-199
//! ```
//!
//! Expressions are parsed once with [`parse`] and evaluated per record with
//! [`Expression::evaluate`]. Evaluation can fail for records whose fields make a
//! statement meaningless, e.g. a rate for a flow that ends before it starts.

mod parser;

use crate::types::{FlowDirection, FlowRecord};
use crate::{error::FlowPipeError, Result};
use std::net::IpAddr;

pub use parser::parse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    Statement(Statement),
}

/// Which endpoint of a flow an address or port statement refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Src,
    Dst,
    Either,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt(u64),
    Le(u64),
    Gt(u64),
    Ge(u64),
    Eq(u64),
    /// Inclusive on both ends.
    Between(u64, u64),
}

impl Comparison {
    pub fn matches(self, value: u64) -> bool {
        match self {
            Comparison::Lt(bound) => value < bound,
            Comparison::Le(bound) => value <= bound,
            Comparison::Gt(bound) => value > bound,
            Comparison::Ge(bound) => value >= bound,
            Comparison::Eq(bound) => value == bound,
            Comparison::Between(low, high) => low <= value && value <= high,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressPrefix {
    pub address: IpAddr,
    pub len: u8,
}

impl AddressPrefix {
    pub fn contains(&self, address: IpAddr) -> bool {
        match (self.address, address.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                prefix_matches(&net.octets(), &addr.octets(), self.len)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                prefix_matches(&net.octets(), &addr.octets(), self.len)
            }
            _ => false,
        }
    }
}

fn prefix_matches(net: &[u8], addr: &[u8], len: u8) -> bool {
    let full_bytes = (len / 8) as usize;
    if net[..full_bytes] != addr[..full_bytes] {
        return false;
    }
    let rest = len % 8;
    if rest == 0 {
        return true;
    }
    let mask = 0xffu8 << (8 - rest);
    net[full_bytes] & mask == addr[full_bytes] & mask
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Address(Endpoint, AddressPrefix),
    Port(Endpoint, Comparison),
    Protocol(u32),
    Bytes(Comparison),
    Packets(Comparison),
    Bps(Comparison),
    CustomerId(Comparison),
    Direction(FlowDirection),
}

impl Statement {
    fn evaluate(&self, record: &FlowRecord) -> Result<bool> {
        let matched = match self {
            Statement::Address(endpoint, prefix) => match endpoint {
                Endpoint::Src => prefix.contains(record.src_addr),
                Endpoint::Dst => prefix.contains(record.dst_addr),
                Endpoint::Either => {
                    prefix.contains(record.src_addr) || prefix.contains(record.dst_addr)
                }
            },
            Statement::Port(endpoint, comparison) => {
                let src = comparison.matches(u64::from(record.src_port));
                let dst = comparison.matches(u64::from(record.dst_port));
                match endpoint {
                    Endpoint::Src => src,
                    Endpoint::Dst => dst,
                    Endpoint::Either => src || dst,
                }
            }
            Statement::Protocol(number) => record.protocol == *number,
            Statement::Bytes(comparison) => comparison.matches(record.byte_count),
            Statement::Packets(comparison) => comparison.matches(record.packet_count),
            Statement::Bps(comparison) => {
                if record.flow_end_time < record.flow_start_time {
                    return Err(FlowPipeError::FilterEvaluation(format!(
                        "bps of a flow ending at {} before its start at {}",
                        record.flow_end_time, record.flow_start_time
                    )));
                }
                let bps = record.byte_count.saturating_mul(8) / record.duration_secs();
                comparison.matches(bps)
            }
            Statement::CustomerId(comparison) => comparison.matches(u64::from(record.customer_id)),
            Statement::Direction(direction) => record.flow_direction == *direction,
        };
        Ok(matched)
    }
}

impl Expression {
    /// Decide whether `record` matches.
    pub fn evaluate(&self, record: &FlowRecord) -> Result<bool> {
        match self {
            Expression::And(left, right) => Ok(left.evaluate(record)? && right.evaluate(record)?),
            Expression::Or(left, right) => Ok(left.evaluate(record)? || right.evaluate(record)?),
            Expression::Not(inner) => Ok(!inner.evaluate(record)?),
            Expression::Statement(statement) => statement.evaluate(record),
        }
    }
}
