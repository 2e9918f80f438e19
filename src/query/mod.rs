pub mod listing;

pub use listing::{
    list_details, list_summaries, DetailListFilter, ListFilter, Page, PageRequest, Sort,
    SortDirection, SortKey,
};
