//! Dictionary coder for short ASCII payloads.
//!
//! A fixed 254-entry codebook tuned for English-ish terminal text: codes
//! `0..=253` stand for codebook entries, `0xFE` escapes a single literal
//! byte, and `0xFF` escapes a literal run (`[0xFF][len-1][bytes]`, up to
//! 256 bytes). Compression is greedy longest-match, so any byte sequence
//! round-trips; input with no codebook hits simply grows by the escape
//! overhead. Well suited to keystroke-granularity interactive bursts where
//! a general-purpose compressor has nothing to work with.

use std::collections::HashMap;
use std::sync::OnceLock;

use thiserror::Error;

const LITERAL_BYTE: u8 = 0xFE;
const LITERAL_RUN: u8 = 0xFF;
const MAX_RUN: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SmazError {
    #[error("truncated literal escape")]
    TruncatedLiteral,
}

#[rustfmt::skip]
const CODEBOOK: [&[u8]; 254] = [
    b" ", b"the", b"e", b"t", b"a", b"of", b"o", b"and", b"i", b"n", b"s", b"e ", b"r", b" th",
    b" t", b"in", b"he", b"th", b"h", b"he ", b"to", b"\r\n", b"l", b"s ", b"d", b" a", b"an",
    b"er", b"c", b" o", b"d ", b"on", b" of", b"re", b"of ", b"t ", b", ", b"is", b"u", b"at",
    b"   ", b"n ", b"or", b"which", b"f", b"m", b"as", b"it", b"that", b"\n", b"was", b"en",
    b"  ", b" w", b"es", b" an", b" i", b"\r", b"f ", b"g", b"p", b"nd", b" s", b"nd ", b"ed ",
    b"w", b"ed", b"http://", b"for", b"te", b"ing", b"y ", b"The", b" c", b"ti", b"r ", b"his",
    b"st", b" in", b"ar", b"nt", b",", b" to", b"y", b"ng", b" h", b"with", b"le", b"al", b"to ",
    b"b", b"ou", b"be", b"were", b" b", b"se", b"o ", b"ent", b"ha", b"ng ", b"their", b"\"",
    b"hi", b"from", b" f", b"in ", b"de", b"ion", b"me", b"v", b".", b"ve", b"all", b"re ",
    b"ri", b"ro", b"is ", b"co", b"f t", b"are", b"ea", b". ", b"her", b" m", b"er ", b" p",
    b"es ", b"by", b"they", b"di", b"ra", b"ic", b"not", b"s, ", b"d t", b"at ", b"ce", b"la",
    b"h ", b"ne", b"as ", b"tio", b"on ", b"n t", b"io", b"we", b" a ", b"om", b", a", b"s o",
    b"ur", b"li", b"ll", b"ch", b"had", b"this", b"e t", b"g ", b"e\r\n", b" wh", b"ere",
    b" co", b"e o", b"a ", b"us", b" d", b"ss", b"\n\r\n", b"\r\n\r", b"=\"", b" be", b" e",
    b"s a", b"ma", b"one", b"t t", b"or ", b"but", b"el", b"so", b"l ", b"e s", b"s,", b"no",
    b"ter", b" wa", b"iv", b"ho", b"e a", b" r", b"hat", b"s t", b"ns", b"ch ", b"wh", b"tr",
    b"ut", b"/", b"have", b"ly ", b"ta", b" ha", b" on", b"tha", b"-", b" l", b"ati", b"en ",
    b"pe", b" re", b"there", b"ass", b"si", b" fo", b"wa", b"ec", b"our", b"who", b"its", b"z",
    b"fo", b"rs", b">", b"ot", b"un", b"<", b"im", b"th ", b"nc", b"ate", b"><", b"ver", b"ad",
    b" we", b"ly", b"ee", b" n", b"id", b" cl", b"ac", b"il", b"</", b"rt", b" wi", b"div",
    b"e, ", b" it", b"whi", b" ma", b"ge", b"x", b"e c", b"men", b".com",
];

/// Longest codebook entry ("http://").
const MAX_ENTRY_LEN: usize = 7;

fn lookup() -> &'static HashMap<&'static [u8], u8> {
    static MAP: OnceLock<HashMap<&'static [u8], u8>> = OnceLock::new();
    MAP.get_or_init(|| {
        CODEBOOK
            .iter()
            .enumerate()
            .map(|(code, entry)| (*entry, code as u8))
            .collect()
    })
}

pub fn compress(input: &[u8]) -> Vec<u8> {
    let map = lookup();
    let mut out = Vec::with_capacity(input.len() / 2 + 8);
    let mut literals: Vec<u8> = Vec::new();
    let mut i = 0;

    while i < input.len() {
        let longest = MAX_ENTRY_LEN.min(input.len() - i);
        let hit = (1..=longest)
            .rev()
            .find_map(|len| map.get(&input[i..i + len]).map(|&code| (code, len)));
        match hit {
            Some((code, len)) => {
                flush_literals(&mut out, &mut literals);
                out.push(code);
                i += len;
            }
            None => {
                literals.push(input[i]);
                i += 1;
                if literals.len() == MAX_RUN {
                    flush_literals(&mut out, &mut literals);
                }
            }
        }
    }
    flush_literals(&mut out, &mut literals);
    out
}

fn flush_literals(out: &mut Vec<u8>, literals: &mut Vec<u8>) {
    match literals.len() {
        0 => {}
        1 => {
            out.push(LITERAL_BYTE);
            out.push(literals[0]);
        }
        len => {
            out.push(LITERAL_RUN);
            out.push((len - 1) as u8);
            out.extend_from_slice(literals);
        }
    }
    literals.clear();
}

pub fn decompress(input: &[u8]) -> Result<Vec<u8>, SmazError> {
    let mut out = Vec::with_capacity(input.len() * 3);
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            LITERAL_BYTE => {
                let &b = input.get(i + 1).ok_or(SmazError::TruncatedLiteral)?;
                out.push(b);
                i += 2;
            }
            LITERAL_RUN => {
                let len = *input.get(i + 1).ok_or(SmazError::TruncatedLiteral)? as usize + 1;
                let run = input
                    .get(i + 2..i + 2 + len)
                    .ok_or(SmazError::TruncatedLiteral)?;
                out.extend_from_slice(run);
                i += 2 + len;
            }
            code => {
                out.extend_from_slice(CODEBOOK[code as usize]);
                i += 1;
            }
        }
    }
    Ok(out)
}
