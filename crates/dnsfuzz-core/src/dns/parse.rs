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
 *  Bounded parsing of DNS headers and questions.
 *
 *  This parser is pointed at the very payloads we build to break servers, so it must terminate on
 *  all of them.  Compression pointers must point strictly backwards, and only a fixed number of
 *  them are followed per name.
 */
use crate::dns::dnspkt;

/// Maximum number of compression pointers followed while reading one name.
pub const MAX_POINTER_HOPS: usize = 16;
/// Maximum length of a name on the wire (RFC1035 §2.3.4).
pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub header: dnspkt::Header,
    pub questions: Vec<dnspkt::Question>,
}

pub struct PktParser<'l> {
    buffer: &'l [u8],
    offset: usize,
}

impl<'l> PktParser<'l> {
    pub fn new(buffer: &'l [u8]) -> PktParser<'l> {
        PktParser { buffer, offset: 0 }
    }

    fn peek_u8(&self) -> Result<u8, String> {
        if self.offset < self.buffer.len() {
            Ok(self.buffer[self.offset])
        } else {
            Err("Truncated Packet (u8)".into())
        }
    }

    fn get_u8(&mut self) -> Result<u8, String> {
        let ret = self.peek_u8()?;
        self.offset += 1;
        Ok(ret)
    }

    fn get_u16(&mut self) -> Result<u16, String> {
        Ok((self.get_u8()? as u16) * 256 + (self.get_u8()? as u16))
    }

    fn get_bytes(&mut self, count: usize) -> Result<Vec<u8>, String> {
        if self.offset + count <= self.buffer.len() {
            let ret = self.buffer[self.offset..self.offset + count].to_vec();
            self.offset += count;
            Ok(ret)
        } else {
            Err(format!(
                "Truncated packet, reading {} bytes (only {} remaining)",
                count,
                self.buffer.len() - self.offset
            ))
        }
    }

    fn get_domain_into(
        &mut self,
        domainv: &mut Vec<dnspkt::Label>,
        wire_len: &mut usize,
        hops: usize,
    ) -> Result<(), String> {
        loop {
            let here = self.offset;
            let prefix = self.get_u8()?;
            match prefix {
                0 => {
                    // End of domain marker.
                    *wire_len += 1;
                    return Ok(());
                }
                p if p & 0b1100_0000 == 0 => {
                    // Uncompressed label; there must still be room for the root label after it.
                    *wire_len += 1 + p as usize;
                    if *wire_len >= MAX_NAME_LEN {
                        return Err(format!(
                            "Domain name exceeds {} bytes at offset {}",
                            MAX_NAME_LEN, here
                        ));
                    }
                    domainv.push(dnspkt::Label::from(self.get_bytes(p as usize)?));
                }
                offset_high if offset_high & 0b1100_0000 == 0b1100_0000 => {
                    // Compressed label.
                    if hops >= MAX_POINTER_HOPS {
                        return Err(format!(
                            "More than {} compression pointers at offset {}",
                            MAX_POINTER_HOPS, here
                        ));
                    }
                    let offset_low = self.get_u8()?;
                    let target =
                        (((offset_high & !0b1100_0000) as usize) << 8) | (offset_low as usize);
                    if target >= here {
                        return Err(format!(
                            "Compression pointer at offset {} does not point backwards (target {})",
                            here, target
                        ));
                    }
                    let saved_offset = self.offset;
                    self.offset = target;
                    let ret = self.get_domain_into(domainv, wire_len, hops + 1);
                    self.offset = saved_offset;
                    return ret;
                }
                marker => {
                    return Err(format!(
                        "Unsupported label type ({:x}) at offset {}",
                        marker, here
                    ))
                }
            }
        }
    }

    pub fn get_domain(&mut self) -> Result<dnspkt::Domain, String> {
        let mut domainv = Vec::new();
        let mut wire_len = 0;
        self.get_domain_into(&mut domainv, &mut wire_len, 0)
            .map(|_| dnspkt::Domain::from(domainv))
    }

    pub fn get_header(&mut self) -> Result<dnspkt::Header, String> {
        let qid = self
            .get_u16()
            .map_err(|m| format!("{} while reading qid", m))?;
        let flags = self
            .get_u16()
            .map_err(|m| format!("{} while reading flags", m))?;
        let qdcount = self
            .get_u16()
            .map_err(|m| format!("{} while reading qdcount", m))?;
        let ancount = self
            .get_u16()
            .map_err(|m| format!("{} while reading ancount", m))?;
        let nscount = self
            .get_u16()
            .map_err(|m| format!("{} while reading nscount", m))?;
        let arcount = self
            .get_u16()
            .map_err(|m| format!("{} while reading arcount", m))?;
        Ok(dnspkt::Header {
            qid,
            flags,
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }

    pub fn get_question(&mut self) -> Result<dnspkt::Question, String> {
        let qdomain = self
            .get_domain()
            .map_err(|m| format!("{} while reading qdomain", m))?;
        let qtype = dnspkt::Type(
            self.get_u16()
                .map_err(|m| format!("{} while reading qtype", m))?,
        );
        let qclass = dnspkt::Class(
            self.get_u16()
                .map_err(|m| format!("{} while reading qclass", m))?,
        );
        Ok(dnspkt::Question {
            qdomain,
            qtype,
            qclass,
        })
    }

    /// Parse the header and every question it declares.  Answer, authority and additional
    /// sections are not decoded; a header declaring any is only rejected when no bytes at all
    /// follow the questions.
    pub fn get_query(&mut self) -> Result<ParsedMessage, String> {
        let header = self.get_header()?;
        let mut questions = vec![];
        for i in 0..header.qdcount {
            // Each question is at least 5 bytes, so this bounds work by the buffer length.
            if self.offset >= self.buffer.len() {
                return Err(format!(
                    "Header declares {} questions, only {} present",
                    header.qdcount, i
                ));
            }
            questions.push(
                self.get_question()
                    .map_err(|e| format!("{} while reading question {}", e, i))?,
            );
        }
        if header.ancount != 0 || header.nscount != 0 || header.arcount != 0 {
            if self.offset >= self.buffer.len() {
                return Err(format!(
                    "Header declares {}/{}/{} records but none are present",
                    header.ancount, header.nscount, header.arcount
                ));
            }
        }
        Ok(ParsedMessage { header, questions })
    }
}

/// The transaction id of a reply, if it is long enough to have one.
pub fn reply_id(buf: &[u8]) -> Option<u16> {
    match buf {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pointer {
    pub offset: usize,
    pub target: usize,
}

impl Pointer {
    /// A pointer that does not point strictly backwards can take part in a loop.
    pub fn is_loop_candidate(&self) -> bool {
        self.target >= self.offset
    }
}

/// Walk the question names of `buf`, following compression pointers but never revisiting an
/// offset, and list every pointer encountered.  Unlike `PktParser` this tolerates loops, since
/// its purpose is to describe them.
pub fn compression_pointers(buf: &[u8]) -> Vec<Pointer> {
    let mut ret = vec![];
    let qdcount = match PktParser::new(buf).get_header() {
        Ok(h) => h.qdcount,
        Err(_) => return ret,
    };
    let mut offset = dnspkt::HEADER_LEN;
    for _ in 0..qdcount {
        let mut visited = std::collections::HashSet::new();
        let mut pos = offset;
        let mut name_end = None;
        loop {
            if pos >= buf.len() || !visited.insert(pos) {
                break;
            }
            match buf[pos] {
                0 => {
                    name_end.get_or_insert(pos + 1);
                    break;
                }
                l if l & 0b1100_0000 == 0 => pos += 1 + l as usize,
                hi if hi & 0b1100_0000 == 0b1100_0000 => {
                    let Some(&lo) = buf.get(pos + 1) else { break };
                    let target = (((hi & !0b1100_0000) as usize) << 8) | lo as usize;
                    ret.push(Pointer {
                        offset: pos,
                        target,
                    });
                    name_end.get_or_insert(pos + 2);
                    pos = target;
                }
                _ => break,
            }
        }
        match name_end {
            // Skip qtype and qclass.
            Some(end) => offset = end + 4,
            None => break,
        }
    }
    ret
}

/// One line summary of what a payload looks like to a careful parser.
pub fn describe(buf: &[u8]) -> String {
    match PktParser::new(buf).get_query() {
        Ok(msg) => format!(
            "parses as {} question(s): {}",
            msg.questions.len(),
            msg.questions
                .iter()
                .map(|q| q.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Err(e) => format!("rejected: {}", e),
    }
}
