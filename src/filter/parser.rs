use super::{AddressPrefix, Comparison, Endpoint, Expression, Statement};
use crate::protocols::protocol_number;
use crate::types::FlowDirection;
use crate::{error::FlowPipeError, Result};
use std::net::IpAddr;

/// Parse filter `text` into an [`Expression`].
pub fn parse(text: &str) -> Result<Expression> {
    let mut parser = Parser {
        tokens: tokenize(text),
        pos: 0,
    };
    if parser.tokens.is_empty() {
        return Err(syntax("empty filter expression"));
    }
    let expression = parser.expression()?;
    match parser.peek() {
        None => Ok(expression),
        Some(token) => Err(syntax(format!("unexpected '{}'", token))),
    }
}

fn syntax(message: impl Into<String>) -> FlowPipeError {
    FlowPipeError::FilterSyntax(message.into())
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '(' | ')' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_string());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

struct Parser {
    tokens: Vec<String>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn next(&mut self, expected: &str) -> Result<String> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| syntax(format!("unexpected end of expression, expected {}", expected)))?;
        self.pos += 1;
        Ok(token)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(token) if token.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expression(&mut self) -> Result<Expression> {
        let mut left = self.term()?;
        while self.eat_keyword("or") {
            let right = self.term()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expression> {
        let mut left = self.factor()?;
        while self.eat_keyword("and") {
            let right = self.factor()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expression> {
        if self.eat_keyword("not") {
            return Ok(Expression::Not(Box::new(self.factor()?)));
        }
        if self.eat_keyword("(") {
            let inner = self.expression()?;
            if !self.eat_keyword(")") {
                return Err(syntax("missing closing parenthesis"));
            }
            return Ok(inner);
        }
        Ok(Expression::Statement(self.statement()?))
    }

    fn statement(&mut self) -> Result<Statement> {
        let endpoint = if self.eat_keyword("src") {
            Endpoint::Src
        } else if self.eat_keyword("dst") {
            Endpoint::Dst
        } else {
            Endpoint::Either
        };

        let keyword = self.next("a statement")?.to_ascii_lowercase();
        match keyword.as_str() {
            "address" => Ok(Statement::Address(endpoint, self.prefix()?)),
            "port" => Ok(Statement::Port(endpoint, self.comparison()?)),
            _ if endpoint != Endpoint::Either => Err(syntax(format!(
                "expected 'address' or 'port' after src/dst, found '{}'",
                keyword
            ))),
            "proto" => self.protocol(),
            "bytes" => Ok(Statement::Bytes(self.comparison()?)),
            "packets" => Ok(Statement::Packets(self.comparison()?)),
            "bps" => Ok(Statement::Bps(self.comparison()?)),
            "cid" => Ok(Statement::CustomerId(self.comparison()?)),
            "direction" => {
                let value = self.next("ingress or egress")?;
                match value.to_ascii_lowercase().as_str() {
                    "ingress" => Ok(Statement::Direction(FlowDirection::Ingress)),
                    "egress" => Ok(Statement::Direction(FlowDirection::Egress)),
                    _ => Err(syntax(format!("unknown direction '{}'", value))),
                }
            }
            _ => Err(syntax(format!("unknown statement '{}'", keyword))),
        }
    }

    fn protocol(&mut self) -> Result<Statement> {
        let value = self.next("a protocol name or number")?;
        let number = match value.parse::<u32>() {
            Ok(number) => number,
            Err(_) => protocol_number(&value)
                .ok_or_else(|| syntax(format!("unknown protocol '{}'", value)))?,
        };
        Ok(Statement::Protocol(number))
    }

    fn prefix(&mut self) -> Result<AddressPrefix> {
        let value = self.next("an address")?;
        let (address, len) = match value.split_once('/') {
            Some((address, len)) => (address, Some(len)),
            None => (value.as_str(), None),
        };
        let address: IpAddr = address
            .parse()
            .map_err(|_| syntax(format!("invalid address '{}'", value)))?;
        let max = if address.is_ipv4() { 32 } else { 128 };
        let len = match len {
            Some(len) => len
                .parse::<u8>()
                .ok()
                .filter(|len| *len <= max)
                .ok_or_else(|| syntax(format!("invalid prefix length in '{}'", value)))?,
            None => max,
        };
        Ok(AddressPrefix { address, len })
    }

    fn comparison(&mut self) -> Result<Comparison> {
        let token = self.next("a number")?;
        let operators: [(&str, fn(u64) -> Comparison); 5] = [
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
            ("=", Comparison::Eq),
        ];
        for (operator, build) in operators {
            if let Some(rest) = token.strip_prefix(operator) {
                let operand = if rest.is_empty() {
                    self.next("a number")?
                } else {
                    rest.to_string()
                };
                return Ok(build(number(&operand)?));
            }
        }
        match token.split_once('-') {
            Some((low, high)) => {
                let (low, high) = (number(low)?, number(high)?);
                if low > high {
                    return Err(syntax(format!("empty range '{}'", token)));
                }
                Ok(Comparison::Between(low, high))
            }
            None => Ok(Comparison::Eq(number(&token)?)),
        }
    }
}

fn number(text: &str) -> Result<u64> {
    text.parse()
        .map_err(|_| syntax(format!("expected a number, found '{}'", text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_and_binds_tighter_than_or() {
        let parsed = parse("proto tcp or proto udp and port 53").unwrap();
        let expected = Expression::Or(
            Box::new(Expression::Statement(Statement::Protocol(6))),
            Box::new(Expression::And(
                Box::new(Expression::Statement(Statement::Protocol(17))),
                Box::new(Expression::Statement(Statement::Port(
                    Endpoint::Either,
                    Comparison::Eq(53),
                ))),
            )),
        );
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_comparison_forms() {
        let cases = [
            ("bytes > 10", Comparison::Gt(10)),
            ("bytes >10", Comparison::Gt(10)),
            ("bytes <= 7", Comparison::Le(7)),
            ("bytes =3", Comparison::Eq(3)),
            ("bytes 3", Comparison::Eq(3)),
            ("bytes 3-9", Comparison::Between(3, 9)),
        ];
        for (text, comparison) in cases {
            assert_eq!(
                parse(text).unwrap(),
                Expression::Statement(Statement::Bytes(comparison)),
                "{}",
                text
            );
        }
    }

    #[test]
    fn test_parentheses_need_no_spaces() {
        assert!(parse("(proto tcp)and(not port 22)").is_ok());
    }

    #[test]
    fn test_syntax_errors() {
        for text in [
            "",
            "   ",
            "proto",
            "proto nosuchproto",
            "src proto tcp",
            "port abc",
            "bytes 9-3",
            "address 10.0.0.0/33",
            "address nonsense",
            "direction sideways",
            "(proto tcp",
            "proto tcp)",
            "proto tcp and",
            "frobnicate 5",
        ] {
            assert!(
                matches!(parse(text), Err(FlowPipeError::FilterSyntax(_))),
                "{:?} should not parse",
                text
            );
        }
    }
}
