//! Prints a bcrypt hash for the studio admin password.

use std::io::{self, BufRead};

use bcrypt::{hash, DEFAULT_COST};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "hash-password", about = "Hash the studio admin password for ADMIN_HASH_PASSWORD")]
struct Args {
    /// Password to hash; read from stdin when omitted
    password: Option<String>,

    /// bcrypt work factor (4-31)
    #[arg(long, default_value_t = DEFAULT_COST)]
    cost: u32,
}

fn read_stdin_line() -> io::Result<String> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn main() {
    let args = Args::parse();

    let password = match args.password {
        Some(password) => password,
        None => match read_stdin_line() {
            Ok(password) => password,
            Err(e) => {
                eprintln!("Error reading password: {}", e);
                std::process::exit(1);
            }
        },
    };
    if password.is_empty() {
        eprintln!("Usage: hash-password <PASSWORD>  (or pipe it on stdin)");
        std::process::exit(1);
    }

    match hash(&password, args.cost) {
        Ok(hashed) => {
            println!("\nCost     : {}", args.cost);
            println!("Hash     : {}\n", hashed);
            println!("# Paste this into your .env:");
            println!("ADMIN_HASH_PASSWORD={}", hashed);
        }
        Err(e) => {
            eprintln!("Error hashing password: {}", e);
            std::process::exit(1);
        }
    }
}
