//! Stats module - grouping, joins and mode aggregation

mod aggregator;
mod mode;

pub use aggregator::{
    AggregateOptions, Aggregates, Aggregator, JoinedReview, ListingAggregate, ParishSource,
    ParishTotal, PriceSource, QuarterlyParishStat,
};
pub use mode::{ModeCounter, TieBreak};
