//! A minimal interactive shell over one database file.
//!
//! Commands operate on the table tree rooted at page 1:
//!   insert <key> <text>
//!   find <key>
//!   scan
//!   quit

use std::io::{BufRead, Write};

use anyhow::{bail, Context, Result};
use streaming_iterator::StreamingIterator;

use minidb::btree::{BTree, Error as TreeError};
use minidb::cursor::Scan;

const TABLE_ROOT: u32 = 1;

fn main() -> Result<()> {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .context("Usage: minidb DATABASE")?;
    let mut bt = BTree::open(&path).with_context(|| format!("opening {}", path))?;

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("minidb> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        match run_command(&mut bt, line.trim()) {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => println!("error: {:#}", e),
        }
    }
    bt.close()?;
    Ok(())
}

/// Executes one shell line. Returns true when the shell should exit.
fn run_command(bt: &mut BTree, line: &str) -> Result<bool> {
    let mut words = line.split_whitespace();
    match words.next() {
        None => Ok(false),
        Some("quit") | Some("exit") => Ok(true),
        Some("insert") => {
            let key: u32 = words.next().context("insert needs a key")?.parse()?;
            let text = words.collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                bail!("insert needs a value");
            }
            bt.insert_in_table(TABLE_ROOT, key, text.as_bytes())?;
            Ok(false)
        }
        Some("find") => {
            let key: u32 = words.next().context("find needs a key")?.parse()?;
            match bt.find(TABLE_ROOT, key) {
                Ok(data) => println!("{}", String::from_utf8_lossy(&data)),
                Err(TreeError::NotFound) => println!("(not found)"),
                Err(e) => return Err(e.into()),
            }
            Ok(false)
        }
        Some("scan") => {
            let mut scan = Scan::new(bt, TABLE_ROOT)?;
            while let Some((key, data)) = scan.next() {
                println!("{}: {}", key, String::from_utf8_lossy(data));
            }
            Ok(false)
        }
        Some(cmd) => bail!("unknown command: {}", cmd),
    }
}
