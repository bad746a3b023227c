pub mod rate_ingestor;
