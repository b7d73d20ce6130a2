// src/gtid.rs

//! Global transaction identifiers: a `(domain, server_id, sequence)` triplet
//! and the domain-keyed list of triplets a server reports as its current
//! position, binlog position, or a replica's IO position.

use std::cmp::Ordering;
use std::fmt;

/// How missing domains are handled by [`GtidList::events_ahead`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingDomainMode {
    /// Domains present on one side only are ignored.
    Ignore,
    /// A domain present on `lhs` but not `rhs` adds its whole sequence number
    /// to the total.
    LhsAdd,
}

/// A single `(domain, server_id, sequence)` triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GtidTriplet {
    pub domain: u32,
    pub server_id: u32,
    pub sequence: u64,
}

impl GtidTriplet {
    pub fn new(domain: u32, server_id: u32, sequence: u64) -> Self {
        Self {
            domain,
            server_id,
            sequence,
        }
    }

    /// Parses one triplet starting at `s`, returning the triplet and the
    /// remainder of the string after it (past a trailing `,` if any).
    fn parse_one(s: &str) -> Option<(Self, &str)> {
        let first_dash = s.find('-')?;
        let (domain_str, after_domain) = s.split_at(first_dash);
        let after_domain = &after_domain[1..];

        let second_dash = after_domain.find('-')?;
        let (server_id_str, after_server) = after_domain.split_at(second_dash);
        let after_server = &after_server[1..];

        let (seq_str, rest) = match after_server.find(',') {
            Some(idx) => (&after_server[..idx], &after_server[idx + 1..]),
            None => (after_server, ""),
        };

        let domain: u32 = domain_str.parse().ok()?;
        let server_id: u32 = server_id_str.parse().ok()?;
        let sequence: u64 = seq_str.parse().ok()?;

        Some((
            GtidTriplet {
                domain,
                server_id,
                sequence,
            },
            rest,
        ))
    }
}

impl fmt::Display for GtidTriplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.domain, self.server_id, self.sequence)
    }
}

/// An ordered-by-domain set of [`GtidTriplet`]s, as reported by a server's
/// `gtid_current_pos`, `gtid_binlog_pos`, or a replica connection's IO
/// position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GtidList {
    triplets: Vec<GtidTriplet>,
}

impl GtidList {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.triplets.is_empty()
    }

    /// Parses a gtid-list string such as `1-2-3,2-3-4`. An unparsable string
    /// yields an empty list, matching the source implementation's behavior
    /// of discarding the whole value on any parse error rather than risking
    /// acting on a partially-parsed position.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return Self::empty();
        }

        let mut triplets = Vec::new();
        let mut rest = s;
        loop {
            match GtidTriplet::parse_one(rest) {
                Some((triplet, remainder)) => {
                    triplets.push(triplet);
                    if remainder.is_empty() {
                        break;
                    }
                    rest = remainder;
                }
                None => return Self::empty(),
            }
        }

        triplets.sort_by_key(|t| t.domain);
        Self { triplets }
    }

    /// Emits the canonical string form, sorted by domain ascending.
    pub fn to_string_sorted(&self) -> String {
        self.triplets
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Returns the triplet for `domain`, if present.
    pub fn get(&self, domain: u32) -> Option<GtidTriplet> {
        self.triplets
            .binary_search_by_key(&domain, |t| t.domain)
            .ok()
            .map(|idx| self.triplets[idx])
    }

    pub fn domains(&self) -> impl Iterator<Item = u32> + '_ {
        self.triplets.iter().map(|t| t.domain)
    }

    /// The number of events `lhs` is ahead of `rhs`: for every domain common
    /// to both where `lhs`'s sequence exceeds `rhs`'s, the difference is
    /// summed. With [`MissingDomainMode::LhsAdd`], a domain present in `lhs`
    /// but absent from `rhs` contributes its entire sequence number.
    pub fn events_ahead(lhs: &GtidList, rhs: &GtidList, mode: MissingDomainMode) -> u64 {
        let mut i = 0;
        let mut j = 0;
        let mut events: u64 = 0;

        while i < lhs.triplets.len() && j < rhs.triplets.len() {
            let l = lhs.triplets[i];
            let r = rhs.triplets[j];
            match l.domain.cmp(&r.domain) {
                Ordering::Less => {
                    if mode == MissingDomainMode::LhsAdd {
                        events += l.sequence;
                    }
                    i += 1;
                }
                Ordering::Greater => {
                    j += 1;
                }
                Ordering::Equal => {
                    if l.sequence > r.sequence {
                        events += l.sequence - r.sequence;
                    }
                    i += 1;
                    j += 1;
                }
            }
        }

        if mode == MissingDomainMode::LhsAdd {
            while i < lhs.triplets.len() {
                events += lhs.triplets[i].sequence;
                i += 1;
            }
        }

        events
    }

    /// Whether a server at `self` could replicate from a master at
    /// `master_gtid`: true iff `self` has no common domain on which it is
    /// ahead of the master.
    pub fn can_replicate_from(&self, master_gtid: &GtidList) -> bool {
        Self::events_ahead(self, master_gtid, MissingDomainMode::Ignore) == 0
    }
}

impl fmt::Display for GtidList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_sorted())
    }
}
