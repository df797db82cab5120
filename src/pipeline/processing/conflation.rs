//! Entity reconciliation: folds same-entity business records into survivors.
//!
//! Each incoming record is tried against three tiers in fixed order (exact
//! domain, exact phone, fuzzy name within the same postal code). The first
//! tier that hits merges the record into that survivor and the cascade stops.
//! Tier order decides which record is "first seen", so it must not change.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::constants::SOURCE_SEPARATOR;
use crate::domain::CanonicalBusinessRecord;
use crate::observability;

/// Names scoring at or above this (0-100) at the same postal code merge.
pub const NAME_MATCH_THRESHOLD: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Domain,
    Phone,
    FuzzyName,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Domain => "domain",
            MatchTier::Phone => "phone",
            MatchTier::FuzzyName => "fuzzy_name",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConflationStats {
    pub input: usize,
    pub survivors: usize,
    pub domain_merges: usize,
    pub phone_merges: usize,
    pub name_merges: usize,
}

/// Single-use reconciliation state. The indices point into `survivors` and
/// live only as long as one reconciliation pass.
#[derive(Debug, Default)]
pub struct Reconciler {
    survivors: Vec<CanonicalBusinessRecord>,
    by_domain: HashMap<String, usize>,
    by_phone: HashMap<String, usize>,
    by_postal: HashMap<String, BTreeSet<usize>>,
    stats: ConflationStats,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile a whole batch in the order given.
    pub fn reconcile<I>(records: I) -> (Vec<CanonicalBusinessRecord>, ConflationStats)
    where
        I: IntoIterator<Item = CanonicalBusinessRecord>,
    {
        let mut reconciler = Self::new();
        for record in records {
            reconciler.push(record);
        }
        reconciler.finish()
    }

    /// Fold one record in. Returns the tier that matched, or `None` when the
    /// record became a new survivor.
    pub fn push(&mut self, record: CanonicalBusinessRecord) -> Option<MatchTier> {
        self.stats.input += 1;

        match self.find_match(&record) {
            Some((index, tier)) => {
                debug!(
                    tier = tier.as_str(),
                    survivor = %self.survivors[index].company_name,
                    incoming = %record.company_name,
                    "Merging duplicate business record"
                );
                merge_into(&mut self.survivors[index], record);
                self.register(index);
                match tier {
                    MatchTier::Domain => self.stats.domain_merges += 1,
                    MatchTier::Phone => self.stats.phone_merges += 1,
                    MatchTier::FuzzyName => self.stats.name_merges += 1,
                }
                observability::conflation::merged(tier.as_str());
                Some(tier)
            }
            None => {
                self.survivors.push(record);
                self.register(self.survivors.len() - 1);
                None
            }
        }
    }

    pub fn finish(mut self) -> (Vec<CanonicalBusinessRecord>, ConflationStats) {
        self.stats.survivors = self.survivors.len();
        (self.survivors, self.stats)
    }

    fn find_match(&self, record: &CanonicalBusinessRecord) -> Option<(usize, MatchTier)> {
        if let Some(index) = record.domain_key().and_then(|d| self.by_domain.get(&d)) {
            return Some((*index, MatchTier::Domain));
        }
        if let Some(index) = record.phone.as_ref().and_then(|p| self.by_phone.get(p)) {
            return Some((*index, MatchTier::Phone));
        }

        let postal = record.postal_code.as_deref()?;
        self.by_postal
            .get(postal)?
            .iter()
            .copied()
            .find(|&index| {
                name_similarity(&self.survivors[index].company_name, &record.company_name)
                    >= NAME_MATCH_THRESHOLD
            })
            .map(|index| (index, MatchTier::FuzzyName))
    }

    /// Index whatever keys the survivor now carries. Keys already owned by an
    /// earlier survivor stay with it.
    fn register(&mut self, index: usize) {
        let survivor = &self.survivors[index];
        if let Some(domain) = survivor.domain_key() {
            self.by_domain.entry(domain).or_insert(index);
        }
        if let Some(phone) = survivor.phone.clone() {
            self.by_phone.entry(phone).or_insert(index);
        }
        if let Some(postal) = survivor.postal_code.clone() {
            self.by_postal.entry(postal).or_default().insert(index);
        }
    }
}

macro_rules! fill_absent {
    ($target:expr, $incoming:expr, $($field:ident),+ $(,)?) => {
        $(
            if $target.$field.is_none() {
                $target.$field = $incoming.$field;
            }
        )+
    };
}

/// Merge `incoming` into `survivor`. Fields absent on the survivor are taken
/// from the incoming record; conflicting values keep the survivor's. Sources
/// are unioned and `last_verified` takes the later timestamp. The quality
/// score is left for the scorer.
pub fn merge_into(survivor: &mut CanonicalBusinessRecord, incoming: CanonicalBusinessRecord) {
    survivor.source = merge_sources(&survivor.source, &incoming.source);
    survivor.last_verified = survivor.last_verified.max(incoming.last_verified);

    if survivor.state.is_empty() {
        survivor.state = incoming.state;
    }

    fill_absent!(
        survivor,
        incoming,
        domain,
        phone,
        email,
        address_line1,
        city,
        postal_code,
        county,
        county_fips,
        naics_code,
        industry,
        founded_year,
        years_in_business,
        employee_count,
        annual_revenue_usd,
        business_size,
        is_small_business,
    );
}

/// Sorted, de-duplicated union of two `;`-delimited source sets.
pub fn merge_sources(a: &str, b: &str) -> String {
    let tags: BTreeSet<&str> = a
        .split(SOURCE_SEPARATOR)
        .chain(b.split(SOURCE_SEPARATOR))
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .collect();
    tags.into_iter()
        .collect::<Vec<_>>()
        .join(&SOURCE_SEPARATOR.to_string())
}

/// Token-order-insensitive name similarity on a 0-100 scale: the Indel
/// ratio `2 * LCS / (len_a + len_b)` of the token-sorted canonical names.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = canonical_name(a);
    let b = canonical_name(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    rapidfuzz::fuzz::ratio(a.chars(), b.chars()) * 100.0
}

/// Lower-case, punctuation deleted, legal forms folded, tokens sorted.
/// Deleting rather than blanking keeps "Bob's" a single token.
fn canonical_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let mut tokens: Vec<&str> = cleaned
        .split_whitespace()
        .map(|token| match token {
            "corporation" => "corp",
            "incorporated" => "inc",
            "company" => "co",
            "limited" => "ltd",
            other => other,
        })
        .collect();
    tokens.sort_unstable();
    tokens.join(" ")
}
