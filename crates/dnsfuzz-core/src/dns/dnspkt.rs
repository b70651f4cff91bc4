/*   Copyright 2026 The dnsfuzz Authors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 *
 *  SPDX-License-Identifier: Apache-2.0
 *
 *  Datastructures and serialisation of the DNS query subset we send.
 */

use std::fmt;

#[derive(Eq, PartialOrd, Ord, PartialEq, Clone, Copy, Hash)]
pub struct Class(pub u16);

pub const CLASS_IN: Class = Class(1); /* Internet */
pub const CLASS_CH: Class = Class(3); /* ChaosNet */

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CLASS_IN => write!(f, "IN"),
            CLASS_CH => write!(f, "CH"),
            Class(x) => write!(f, "#{}", x),
        }
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Class({})", self)
    }
}

#[derive(PartialOrd, Ord, PartialEq, Eq, Clone, Hash, Copy)]
pub struct Type(pub u16);

pub const RR_A: Type = Type(1);
pub const RR_NS: Type = Type(2);
pub const RR_CNAME: Type = Type(5);
pub const RR_SOA: Type = Type(6);
pub const RR_PTR: Type = Type(12);
pub const RR_MX: Type = Type(15);
pub const RR_TXT: Type = Type(16);
pub const RR_AAAA: Type = Type(28);
pub const RR_ANY: Type = Type(255);

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RR_A => write!(f, "A"),
            RR_NS => write!(f, "NS"),
            RR_CNAME => write!(f, "CNAME"),
            RR_SOA => write!(f, "SOA"),
            RR_PTR => write!(f, "PTR"),
            RR_MX => write!(f, "MX"),
            RR_TXT => write!(f, "TXT"),
            RR_AAAA => write!(f, "AAAA"),
            RR_ANY => write!(f, "ANY"),
            Type(x) => write!(f, "#{}", x),
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Type({})", self)
    }
}

/// Accepts a mnemonic ("MX", case insensitive) or a bare number ("65535").
impl std::str::FromStr for Type {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RR_A),
            "NS" => Ok(RR_NS),
            "CNAME" => Ok(RR_CNAME),
            "SOA" => Ok(RR_SOA),
            "PTR" => Ok(RR_PTR),
            "MX" => Ok(RR_MX),
            "TXT" => Ok(RR_TXT),
            "AAAA" => Ok(RR_AAAA),
            "ANY" => Ok(RR_ANY),
            n => n
                .parse::<u16>()
                .map(Type)
                .map_err(|_| format!("Unknown RR type {:?}", s)),
        }
    }
}

fn display_byte(b: u8) -> String {
    match b {
        n @ 33..=126 if n != b'.' && n != b'\\' => char::from(n).to_string(),
        n => format!("\\{:03}", n),
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Label(Vec<u8>);

impl From<Vec<u8>> for Label {
    fn from(v: Vec<u8>) -> Self {
        Label(v)
    }
}

impl Label {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.0.iter().map(|&b| display_byte(b)).collect::<String>()
        )
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Domain(Vec<Label>);

impl From<Vec<Label>> for Domain {
    fn from(v: Vec<Label>) -> Self {
        Domain(v)
    }
}

impl Domain {
    pub fn labels(&self) -> &[Label] {
        &self.0
    }

    /// Length of the name in uncompressed wire format, including the terminating root label.
    pub fn wire_len(&self) -> usize {
        self.0.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, ".");
        }
        write!(
            f,
            "{}",
            self.0
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<String>>()
                .join(".")
        )
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Domain({})", self)
    }
}

// Labels longer than 63 bytes and names longer than 255 bytes are accepted.
impl std::str::FromStr for Domain {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut v = vec![];
        let mut l = vec![];
        for c in s.chars() {
            match c {
                '\\' => return Err("\\ escapes are not supported"),
                '.' => {
                    if l.is_empty() {
                        return Err("illegal empty label");
                    }
                    v.push(Label(l));
                    l = vec![]
                }
                ch if ch.is_ascii() => l.push(ch as u8),
                _ => return Err("illegal character in label"),
            }
        }
        if !l.is_empty() {
            v.push(Label(l));
        }
        Ok(Domain(v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub qdomain: Domain,
    pub qtype: Type,
    pub qclass: Class,
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.qdomain, self.qclass, self.qtype)
    }
}

/// Standard query, recursion desired.
pub const FLAGS_QUERY_RD: u16 = 0x0100;

pub const HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub qid: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    /// A query header declaring `qdcount` questions and nothing else.
    pub fn query(qid: u16, qdcount: u16) -> Self {
        Self {
            qid,
            flags: FLAGS_QUERY_RD,
            qdcount,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }

    pub fn push(&self, v: &mut Vec<u8>) {
        push_u16(v, self.qid);
        push_u16(v, self.flags);
        push_u16(v, self.qdcount);
        push_u16(v, self.ancount);
        push_u16(v, self.nscount);
        push_u16(v, self.arcount);
    }
}

#[derive(Debug)]
pub enum Error {
    LabelTooLong(usize),
    TooManyQuestions(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;
        match self {
            LabelTooLong(l) => write!(
                f,
                "Label of {} bytes cannot be described by a length byte",
                l
            ),
            TooManyQuestions(n) => write!(f, "{} questions do not fit in QDCOUNT", n),
        }
    }
}

impl std::error::Error for Error {}

fn push_u16(v: &mut Vec<u8>, d: u16) {
    v.extend_from_slice(&d.to_be_bytes());
}

fn push_label(v: &mut Vec<u8>, l: &Label) -> Result<(), Error> {
    let len = u8::try_from(l.0.len()).map_err(|_| Error::LabelTooLong(l.0.len()))?;
    v.push(len);
    v.extend_from_slice(l.0.as_slice());
    Ok(())
}

pub fn push_domain(v: &mut Vec<u8>, d: &Domain) -> Result<(), Error> {
    for l in &d.0 {
        push_label(v, l)?;
    }
    v.push(0);
    Ok(())
}

fn push_question(v: &mut Vec<u8>, q: &Question) -> Result<(), Error> {
    push_domain(v, &q.qdomain)?;
    push_u16(v, q.qtype.0);
    push_u16(v, q.qclass.0);
    Ok(())
}

/// A DNS message made of a header and questions only.  Counts are derived from the questions
/// present, so a `Message` always serialises to something structurally valid.
#[derive(Debug, Clone)]
pub struct Message {
    pub qid: u16,
    pub flags: u16,
    pub questions: Vec<Question>,
}

impl Message {
    pub fn query(qid: u16, question: Question) -> Self {
        Self {
            qid,
            flags: FLAGS_QUERY_RD,
            questions: vec![question],
        }
    }

    pub fn serialise(&self) -> Result<Vec<u8>, Error> {
        let qdcount = u16::try_from(self.questions.len())
            .map_err(|_| Error::TooManyQuestions(self.questions.len()))?;
        let mut ret: Vec<u8> = Vec::with_capacity(
            HEADER_LEN
                + self
                    .questions
                    .iter()
                    .map(|q| q.qdomain.wire_len() + 4)
                    .sum::<usize>(),
        );
        Header {
            flags: self.flags,
            ..Header::query(self.qid, qdcount)
        }
        .push(&mut ret);
        for q in &self.questions {
            push_question(&mut ret, q)?;
        }
        Ok(ret)
    }
}
