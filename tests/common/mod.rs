#![allow(dead_code)]

use anyhow::Result;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const HEADER: &str = "computerid,userid,dept,type,applicationid";

pub fn create_test_csv(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Inventory with the worked example: user 1 needs 2 licenses, user 2 needs 1,
/// and the rows for application 999 do not count.
pub fn sample_inventory() -> String {
    [
        HEADER,
        "1,1,sales,computer,374",
        "2,1,sales,laptop,374",
        "3,1,sales,laptop,374",
        "4,1,sales,LAPTOP,374",
        "5,2,ops,laptop,374",
        "6,3,ops,computer,999",
        "7,3,ops,laptop,999",
        "",
    ]
    .join("\n")
}

/// Endless source of matching laptop rows, optionally pausing on each read.
pub struct EndlessInventory {
    header_sent: bool,
    pause: Option<Duration>,
}

impl EndlessInventory {
    pub fn new(pause: Option<Duration>) -> Self {
        Self {
            header_sent: false,
            pause,
        }
    }
}

impl Read for EndlessInventory {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(pause) = self.pause {
            std::thread::sleep(pause);
        }
        let chunk: &[u8] = if self.header_sent {
            b"1,10,,laptop,374\n"
        } else {
            self.header_sent = true;
            b"computerid,userid,dept,type,applicationid\n"
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }
}

/// Yields `data` and then fails with `message`.
pub struct FailingInventory {
    data: io::Cursor<Vec<u8>>,
    message: &'static str,
}

impl FailingInventory {
    pub fn new(data: &str, message: &'static str) -> Self {
        Self {
            data: io::Cursor::new(data.as_bytes().to_vec()),
            message,
        }
    }
}

impl Read for FailingInventory {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.data.read(buf)?;
        if n == 0 {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, self.message))
        } else {
            Ok(n)
        }
    }
}
