pub mod fetch;
pub mod qc_align;
pub mod summarize;
