pub mod company;
pub mod listing;
pub mod scrape_run;
pub mod source;
