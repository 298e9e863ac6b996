pub mod command;
pub mod download;
pub mod fastq;
pub mod file;
pub mod metrics;
pub mod plotting;
pub mod sambam;
pub mod streams;
pub mod system;
pub mod tables;
