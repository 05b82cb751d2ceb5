//! Aggregation Module
//! Builds the derived per-listing and per-parish tables from the cleaned sources.
//!
//! Every reduction is a single pass that feeds a hash-keyed accumulator; output rows
//! keep the order in which their key first appeared.

use super::mode::{ModeCounter, TieBreak};
use crate::data::{
    CalendarEntry, Listing, Parish, ParishQuarterRow, Review, ReviewLanguage, SourceTables,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use tracing::{debug, info};

/// Where per-listing average prices come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Point-in-time listing prices.
    #[default]
    Listings,
    /// Daily calendar prices.
    Calendar,
}

/// Where per-parish quarterly statistics come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParishSource {
    /// Reviews attributed to parishes through their listing's neighbourhood.
    #[default]
    Reviews,
    /// The precomputed parish/quarter language file.
    QuarterlyFile,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateOptions {
    pub price_source: PriceSource,
    pub parish_source: ParishSource,
    pub tie_break: TieBreak,
}

/// One row per distinct listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingAggregate {
    pub listing_id: i64,
    pub name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub room_type: Option<String>,
    pub neighbourhood: Option<String>,
    /// Point-in-time price of the first listing row.
    pub price: Option<f64>,
    pub avg_price: Option<f64>,
    /// Zero when the listing has no reviews.
    pub review_count: u64,
    /// Sample standard deviation of calendar prices.
    pub price_std: Option<f64>,
    pub dominant_language: Option<String>,
}

/// Review count and dominant language for one (parish, quarter).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarterlyParishStat {
    pub parish_id: String,
    pub quarter: String,
    pub review_count: u64,
    pub dominant_language: Option<String>,
}

/// Parish-level roll-up over a set of quarters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParishTotal {
    pub parish_id: String,
    pub name: String,
    pub total_reviews: u64,
    pub language: Option<String>,
}

/// A review with its detected language, if any.
#[derive(Debug, Clone, Copy)]
pub struct JoinedReview<'a> {
    pub review: &'a Review,
    pub language: Option<&'a str>,
}

/// Immutable derived tables shared by every view.
#[derive(Debug, Clone)]
pub struct Aggregates {
    pub listings: Vec<ListingAggregate>,
    pub parish_stats: Vec<QuarterlyParishStat>,
    pub parishes: Vec<Parish>,
    pub tie_break: TieBreak,
}

/// Accumulators keyed by group, remembering first-seen key order.
struct OrderedGroups<K, V> {
    index: HashMap<K, usize>,
    entries: Vec<(K, V)>,
}

impl<K: Hash + Eq + Clone, V: Default> OrderedGroups<K, V> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn entry(&mut self, key: K) -> &mut V {
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, V::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[slot].1
    }

    fn into_entries(self) -> Vec<(K, V)> {
        self.entries
    }
}

fn mean_of(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.mean())
}

fn sample_std(values: &[f64]) -> Option<f64> {
    (values.len() >= 2).then(|| values.std_dev())
}

fn parish_name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Derives aggregate tables from source tables.
pub struct Aggregator;

impl Aggregator {
    /// Build every derived table once.
    pub fn aggregate(sources: &SourceTables, options: &AggregateOptions) -> Aggregates {
        let joined = Self::join_languages(&sources.reviews, &sources.review_languages);

        let listings = Self::listing_aggregates(
            &sources.listings,
            &sources.calendar,
            &joined,
            options.price_source,
            options.tie_break,
        );

        let parish_stats = match options.parish_source {
            ParishSource::Reviews => Self::parish_quarter_stats(
                &joined,
                &sources.listings,
                &sources.parishes,
                options.tie_break,
            ),
            ParishSource::QuarterlyFile => {
                Self::parish_stats_from_quarters(&sources.parish_quarters, options.tie_break)
            }
        };

        info!(
            listings = listings.len(),
            parish_quarters = parish_stats.len(),
            "Aggregates built"
        );

        Aggregates {
            listings,
            parish_stats,
            parishes: sources.parishes.clone(),
            tie_break: options.tie_break,
        }
    }

    /// Left join reviews with detected languages on review id.
    ///
    /// A review id present several times in `languages` takes its first language.
    pub fn join_languages<'a>(
        reviews: &'a [Review],
        languages: &'a [ReviewLanguage],
    ) -> Vec<JoinedReview<'a>> {
        let mut by_review: HashMap<i64, &str> = HashMap::with_capacity(languages.len());
        for row in languages {
            by_review.entry(row.review_id).or_insert(row.language.as_str());
        }

        let joined: Vec<JoinedReview<'a>> = reviews
            .iter()
            .map(|review| JoinedReview {
                review,
                language: by_review.get(&review.id).copied(),
            })
            .collect();

        debug!(
            reviews = joined.len(),
            without_language = joined.iter().filter(|j| j.language.is_none()).count(),
            "Joined review languages"
        );
        joined
    }

    /// Number of review rows per listing id.
    pub fn review_counts<'a>(reviews: impl IntoIterator<Item = &'a Review>) -> HashMap<i64, u64> {
        let mut counts = HashMap::new();
        for review in reviews {
            *counts.entry(review.listing_id).or_insert(0) += 1;
        }
        counts
    }

    fn price_observations(
        prices: impl Iterator<Item = (i64, Option<f64>)>,
    ) -> HashMap<i64, Vec<f64>> {
        let mut observations: HashMap<i64, Vec<f64>> = HashMap::new();
        for (listing_id, price) in prices {
            if let Some(price) = price {
                observations.entry(listing_id).or_default().push(price);
            }
        }
        observations
    }

    /// Per-listing average price, review count, price spread and dominant language.
    pub fn listing_aggregates(
        listings: &[Listing],
        calendar: &[CalendarEntry],
        joined: &[JoinedReview<'_>],
        price_source: PriceSource,
        tie_break: TieBreak,
    ) -> Vec<ListingAggregate> {
        let mut seen = HashSet::with_capacity(listings.len());
        let unique: Vec<&Listing> = listings.iter().filter(|l| seen.insert(l.id)).collect();

        let calendar_prices =
            Self::price_observations(calendar.iter().map(|entry| (entry.listing_id, entry.price)));
        let listing_prices =
            Self::price_observations(listings.iter().map(|listing| (listing.id, listing.price)));
        let avg_source = match price_source {
            PriceSource::Listings => &listing_prices,
            PriceSource::Calendar => &calendar_prices,
        };

        let review_counts = Self::review_counts(joined.iter().map(|j| j.review));
        let mut languages: HashMap<i64, ModeCounter> = HashMap::new();
        for joined_review in joined {
            if let Some(language) = joined_review.language {
                languages
                    .entry(joined_review.review.listing_id)
                    .or_default()
                    .push(language);
            }
        }

        // Order-preserving parallel map
        unique
            .par_iter()
            .map(|listing| {
                let avg_price = avg_source.get(&listing.id).and_then(|v| mean_of(v));
                let price_std = calendar_prices.get(&listing.id).and_then(|v| sample_std(v));
                ListingAggregate {
                    listing_id: listing.id,
                    name: listing.name.clone(),
                    latitude: listing.latitude,
                    longitude: listing.longitude,
                    room_type: listing.room_type.clone(),
                    neighbourhood: listing.neighbourhood.clone(),
                    price: listing.price,
                    avg_price,
                    review_count: review_counts.get(&listing.id).copied().unwrap_or(0),
                    price_std,
                    dominant_language: languages
                        .get(&listing.id)
                        .and_then(|counter| counter.mode(tie_break))
                        .map(str::to_string),
                }
            })
            .collect()
    }

    /// Group reviews by (parish, quarter) via listing neighbourhood → parish name.
    ///
    /// Reviews whose listing, parish or quarter cannot be resolved are skipped.
    pub fn parish_quarter_stats(
        joined: &[JoinedReview<'_>],
        listings: &[Listing],
        parishes: &[Parish],
        tie_break: TieBreak,
    ) -> Vec<QuarterlyParishStat> {
        let parish_by_name: HashMap<String, &str> = parishes
            .iter()
            .map(|p| (parish_name_key(&p.name), p.id.as_str()))
            .collect();

        let mut parish_by_listing: HashMap<i64, &str> = HashMap::new();
        for listing in listings {
            let parish = listing
                .neighbourhood
                .as_deref()
                .and_then(|n| parish_by_name.get(&parish_name_key(n)).copied());
            if let Some(parish_id) = parish {
                parish_by_listing.entry(listing.id).or_insert(parish_id);
            }
        }

        let mut groups: OrderedGroups<(&str, String), (u64, ModeCounter)> = OrderedGroups::new();
        let mut unresolved = 0usize;
        for joined_review in joined {
            let parish = parish_by_listing.get(&joined_review.review.listing_id);
            let (Some(&parish_id), Some(quarter)) = (parish, joined_review.review.quarter) else {
                unresolved += 1;
                continue;
            };
            let (count, counter) = groups.entry((parish_id, quarter.to_string()));
            *count += 1;
            if let Some(language) = joined_review.language {
                counter.push(language);
            }
        }

        if unresolved > 0 {
            debug!(unresolved, "Reviews without parish or quarter");
        }

        groups
            .into_entries()
            .into_iter()
            .map(|((parish_id, quarter), (review_count, counter))| QuarterlyParishStat {
                parish_id: parish_id.to_string(),
                quarter,
                review_count,
                dominant_language: counter.mode(tie_break).map(str::to_string),
            })
            .collect()
    }

    /// Merge precomputed parish/quarter rows, one stat per key.
    pub fn parish_stats_from_quarters(
        rows: &[ParishQuarterRow],
        tie_break: TieBreak,
    ) -> Vec<QuarterlyParishStat> {
        let mut groups: OrderedGroups<(&str, &str), (u64, ModeCounter)> = OrderedGroups::new();
        for row in rows {
            let (count, counter) = groups.entry((row.parish_id.as_str(), row.quarter.as_str()));
            *count += row.num_reviews;
            if let Some(language) = &row.language {
                counter.push(language);
            }
        }

        groups
            .into_entries()
            .into_iter()
            .map(|((parish_id, quarter), (review_count, counter))| QuarterlyParishStat {
                parish_id: parish_id.to_string(),
                quarter: quarter.to_string(),
                review_count,
                dominant_language: counter.mode(tie_break).map(str::to_string),
            })
            .collect()
    }

    /// Roll quarterly stats up to one row per parish, restricted to `selected_quarters`.
    ///
    /// Only parishes with at least one stat in any quarter are returned. An empty
    /// selection means all quarters; a parish with no stat in the selection keeps its
    /// row with zero reviews and no language.
    pub fn parish_totals<S: AsRef<str>>(
        stats: &[QuarterlyParishStat],
        parishes: &[Parish],
        selected_quarters: &[S],
        tie_break: TieBreak,
    ) -> Vec<ParishTotal> {
        let selected: HashSet<&str> = selected_quarters.iter().map(AsRef::as_ref).collect();
        let mut present: HashSet<&str> = HashSet::new();
        let mut rollups: HashMap<&str, (u64, ModeCounter)> = HashMap::new();

        for stat in stats {
            present.insert(stat.parish_id.as_str());
            if !selected.is_empty() && !selected.contains(stat.quarter.as_str()) {
                continue;
            }
            let (total, counter) = rollups.entry(stat.parish_id.as_str()).or_default();
            *total += stat.review_count;
            if let Some(language) = &stat.dominant_language {
                counter.push(language);
            }
        }

        parishes
            .iter()
            .filter(|parish| present.contains(parish.id.as_str()))
            .map(|parish| {
                let rollup = rollups.get(parish.id.as_str());
                ParishTotal {
                    parish_id: parish.id.clone(),
                    name: parish.name.clone(),
                    total_reviews: rollup.map(|(total, _)| *total).unwrap_or(0),
                    language: rollup
                        .and_then(|(_, counter)| counter.mode(tie_break))
                        .map(str::to_string),
                }
            })
            .collect()
    }

    /// Total reviews per quarter, in quarter order.
    pub fn quarterly_totals(stats: &[QuarterlyParishStat]) -> Vec<(String, u64)> {
        let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
        for stat in stats {
            *totals.entry(stat.quarter.as_str()).or_insert(0) += stat.review_count;
        }
        totals
            .into_iter()
            .map(|(quarter, total)| (quarter.to_string(), total))
            .collect()
    }
}
