pub mod inspector;
pub mod parquet_writer;

pub use inspector::{OutputInfo, OutputInspector, OutputRow, PartitionStats};
pub use parquet_writer::{parse_compression, partition_dir_name, ParquetWriter, PartitionInfo, WriteSummary};
