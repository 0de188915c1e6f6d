//! Mock of a file that can be cut back, standing in for std::fs::File.
use mockall::mock;

use batch_etl::item::csv::csv_writer::TruncateWrite;
use std::io::{self, Write};

mock! {
    pub File {}
    impl Write for File {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
        fn flush(&mut self) -> io::Result<()>;
    }
    impl TruncateWrite for File {
        fn seek_end(&mut self) -> io::Result<u64>;
        fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    }
}
