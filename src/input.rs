/**************************************************************************/
/*  This file is part of DEWEIGHT.                                        */
/*                                                                        */
/*  Copyright (C) 2025                                                    */
/*    CEA (Commissariat à l'énergie atomique et aux énergies              */
/*         alternatives)                                                  */
/*                                                                        */
/*  you can redistribute it and/or modify it under the terms of the GNU   */
/*  Lesser General Public License as published by the Free Software       */
/*  Foundation, version 2.1.                                              */
/*                                                                        */
/*  It is distributed in the hope that it will be useful,                 */
/*  but WITHOUT ANY WARRANTY; without even the implied warranty of        */
/*  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the         */
/*  GNU Lesser General Public License for more details.                   */
/*                                                                        */
/*  See the GNU Lesser General Public License version 2.1                 */
/*  for more details (enclosed in the file licenses/LGPLv2.1).            */
/*                                                                        */
/**************************************************************************/

//! Single pass character stream for line oriented formats

use nom::character::complete::{char, digit1};
use nom::combinator::{all_consuming, map_res, opt, recognize};
use nom::sequence::pair;
use nom::IResult;
use std::io::Read;

/// Parses an optionally negative decimal integer.
fn signed(s: &[u8]) -> IResult<&[u8], i64> {
    map_res(
        map_res(recognize(pair(opt(char('-')), digit1)), std::str::from_utf8),
        |x: &str| x.parse(),
    )(s)
}

/// Parses a whole token as an integer.
pub(crate) fn parse_integer(token: &str) -> anyhow::Result<i64> {
    match all_consuming(signed)(token.as_bytes()) {
        Ok((_, n)) => Ok(n),
        Err(_) => anyhow::bail!("expected an integer, found {:?}", token),
    }
}

/// Reads bytes from `R` through a buffer, and never goes back.
pub struct CharStream<R: Read> {
    /// data is in the range index..end
    buffer: Vec<u8>,
    /// data is in the range index..end
    index: usize,
    /// data is in the range index..end
    end: usize,
    /// underlying byte source
    read: R,
    /// 1-based line of the next byte
    line: usize,
    /// 0-based column of the next byte
    column: usize,
}

impl<R: Read> CharStream<R> {
    /// Creates a stream reading `read` by chunks of 64KiB.
    pub fn new(read: R) -> Self {
        Self::with_chunk_size(read, 64 * 1024)
    }

    /// Creates a stream reading `read` by chunks of `chunk_size` bytes.
    ///
    /// `consume` cannot match prefixes longer than `chunk_size`.
    pub fn with_chunk_size(read: R, chunk_size: usize) -> Self {
        assert!(chunk_size > 0);
        Self {
            buffer: vec![0; chunk_size],
            index: 0,
            end: 0,
            read,
            line: 1,
            column: 0,
        }
    }

    /// length of actual data
    fn available(&self) -> usize {
        self.end - self.index
    }

    /// attempts to read one more time for the underlying reader
    /// and refill the buffer
    /// Returns true if at least one more byte is added to the buffer.
    fn refill(&mut self) -> std::io::Result<bool> {
        let mut at_least_a_byte_read = false;
        if self.index != 0 {
            self.buffer.copy_within(self.index..self.end, 0);
            self.end -= self.index;
            self.index = 0;
        }
        loop {
            if self.end == self.buffer.len() {
                return Ok(at_least_a_byte_read);
            }
            match self.read.read(&mut self.buffer[self.end..]) {
                Ok(0) => return Ok(at_least_a_byte_read),
                Ok(n) => {
                    self.end += n;
                    at_least_a_byte_read = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Makes sure at least `n` bytes are buffered. Returns false when EOF comes first.
    fn fill(&mut self, n: usize) -> std::io::Result<bool> {
        debug_assert!(n <= self.buffer.len());
        while self.available() < n {
            if !self.refill()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Drops the next `n` buffered bytes.
    fn advance(&mut self, n: usize) {
        for &c in &self.buffer[self.index..(self.index + n)] {
            if c == b'\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        self.index += n;
    }

    /// Line and column of the next byte, for error messages.
    pub fn position(&self) -> (usize, usize) {
        (self.line, self.column)
    }

    /// The next byte, or `None` at EOF.
    pub fn peek(&mut self) -> anyhow::Result<Option<u8>> {
        if self.fill(1)? {
            Ok(Some(self.buffer[self.index]))
        } else {
            Ok(None)
        }
    }

    /// Consumes `prefix` if the stream starts with it. Consumes nothing otherwise.
    pub fn consume(&mut self, prefix: &[u8]) -> anyhow::Result<bool> {
        anyhow::ensure!(
            prefix.len() <= self.buffer.len(),
            "prefix of {} bytes does not fit in a buffer of {} bytes",
            prefix.len(),
            self.buffer.len()
        );
        if self.fill(prefix.len())? && &self.buffer[self.index..(self.index + prefix.len())] == prefix
        {
            self.advance(prefix.len());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Skips whitespace, newlines included.
    pub fn skip_whitespace(&mut self) -> anyhow::Result<()> {
        while let Some(c) = self.peek()? {
            if !c.is_ascii_whitespace() {
                break;
            }
            self.advance(1);
        }
        Ok(())
    }

    /// Skips up to and including the next newline.
    pub fn skip_line(&mut self) -> anyhow::Result<()> {
        while let Some(c) = self.peek()? {
            self.advance(1);
            if c == b'\n' {
                break;
            }
        }
        Ok(())
    }

    /// Appends what remains of the current line to `out`, without the newline, which is left in
    /// the stream.
    pub fn append_line(&mut self, out: &mut String) -> anyhow::Result<()> {
        let mut bytes = Vec::new();
        while let Some(c) = self.peek()? {
            if c == b'\n' {
                break;
            }
            bytes.push(c);
            self.advance(1);
        }
        out.push_str(&String::from_utf8_lossy(&bytes));
        Ok(())
    }

    /// Skips whitespace and returns the next whitespace delimited token.
    pub fn parse_token(&mut self) -> anyhow::Result<String> {
        self.skip_whitespace()?;
        let (line, column) = self.position();
        let mut bytes = Vec::new();
        while let Some(c) = self.peek()? {
            if c.is_ascii_whitespace() {
                break;
            }
            bytes.push(c);
            self.advance(1);
        }
        anyhow::ensure!(
            !bytes.is_empty(),
            "expected a token (line {}, column {}), found end of input",
            line,
            column
        );
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Skips whitespace and parses the next token as an integer.
    pub fn parse_int(&mut self) -> anyhow::Result<i64> {
        let token = self.parse_token()?;
        let (line, column) = self.position();
        parse_integer(&token).map_err(|e| {
            e.context(format!(
                "line {}, column {}",
                line,
                column.saturating_sub(token.len())
            ))
        })
    }
}

#[test]
fn test_simple() -> anyhow::Result<()> {
    let mut r = CharStream::with_chunk_size(b"12345 -67890\nabc def\n" as &[u8], 8);
    assert_eq!(r.parse_int()?, 12345);
    assert_eq!(r.parse_int()?, -67890);
    assert_eq!(r.position(), (1, 12));
    assert_eq!(r.peek()?, Some(b'\n'));
    r.skip_line()?;
    assert_eq!(r.position(), (2, 0));
    let mut line = String::from(">");
    r.append_line(&mut line)?;
    assert_eq!(line, ">abc def");
    r.skip_line()?;
    assert_eq!(r.peek()?, None);
    assert!(r.parse_token().is_err());
    Ok(())
}

#[test]
fn test_consume() -> anyhow::Result<()> {
    // the prefix straddles two chunks
    let mut r = CharStream::with_chunk_size(b"  p cnf 3 2\n" as &[u8], 6);
    r.skip_whitespace()?;
    assert!(!r.consume(b"p dnf ")?);
    assert!(r.consume(b"p cnf ")?);
    assert_eq!(r.parse_int()?, 3);
    assert_eq!(r.parse_token()?, "2");
    assert!(!r.consume(b"\nmore")?);
    assert!(r.consume(b"\n")?);
    assert!(r.consume(b"")?);
    assert!(r.consume(b"x").map(|ok| !ok)?);
    Ok(())
}

#[test]
fn test_tokens_span_lines() -> anyhow::Result<()> {
    let mut r = CharStream::new(b"1 2\n\n  3 0x" as &[u8]);
    assert_eq!(r.parse_int()?, 1);
    assert_eq!(r.parse_int()?, 2);
    assert_eq!(r.parse_int()?, 3);
    assert!(r.parse_int().is_err());
    Ok(())
}

#[test]
fn test_parse_integer() {
    assert_eq!(parse_integer("-12").unwrap(), -12);
    assert_eq!(parse_integer("0").unwrap(), 0);
    assert!(parse_integer("1/2").is_err());
    assert!(parse_integer("-").is_err());
    assert!(parse_integer("").is_err());
}
