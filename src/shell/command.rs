use colored::*;
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};
use std::{error::Error, time::Duration};

use vsfs::{utils::format_timestamp, FileSystem, MemoryDisk, ROOT_INODE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Ls,
    Pwd,
    Cd(String),
    Whoami,
    Open(String),
    Read(String),
    Write(String, Option<String>),
    Append(String, Option<String>),
    Rm(String),
    Stat(String),
    Df,
    Fsck,
    Format,
    Exit,
}

/// shell 会话：一块虚拟磁盘和当前目录（只有根目录）
pub struct Session {
    pub fs: FileSystem<MemoryDisk>,
    pub current_dir: u32,
}

impl Session {
    pub fn new(fs: FileSystem<MemoryDisk>) -> Self {
        Self {
            fs,
            current_dir: ROOT_INODE,
        }
    }
}

pub fn execute_command(cmd: &Command, session: &mut Session) -> Result<(), Box<dyn Error>> {
    let dir = session.current_dir;
    match cmd {
        Command::Help => print_help(),
        Command::Ls => {
            let entries = session.fs.list(dir)?;
            if entries.is_empty() {
                println!("{}", "(empty)".bright_black());
            }
            for entry in entries {
                let stat = session.fs.stat(&entry.name, dir)?;
                println!(
                    "📄  {:<12} {:>5} {} {}",
                    entry.name,
                    stat.size,
                    "bytes".bright_black(),
                    format!("#{}", entry.inode_number).bright_black()
                );
            }
        }
        Command::Pwd => println!("📍 {}", "/".cyan()),
        Command::Cd(path) => match path.as_str() {
            "/" | "." | ".." => println!("📂 Moved to {}", "/".blue()),
            other => println!("{} {}", "⚠️  No such directory:".yellow(), other),
        },
        Command::Whoami => println!("{}", whoami::username().green()),
        Command::Open(name) => {
            let (inode, created) = session.fs.open(name, dir)?;
            if created {
                println!("📝 Created file: {} (inode {})", name.green(), inode);
            } else {
                println!("📂 Opened file: {} (inode {})", name.cyan(), inode);
            }
        }
        Command::Read(name) => {
            let payload = session.fs.read(name, dir)?;
            println!("{}", String::from_utf8_lossy(&payload));
        }
        Command::Write(name, content) => {
            let content = content_or_prompt(content)?;
            session.fs.write(name, dir, content.as_bytes())?;
            println!("✏️  Wrote {} bytes to {}", content.len(), name.cyan());
        }
        Command::Append(name, content) => {
            let content = content_or_prompt(content)?;
            session.fs.append(name, dir, content.as_bytes())?;
            println!("✏️  Appended {} bytes to {}", content.len(), name.cyan());
        }
        Command::Rm(name) => {
            session.fs.unlink(name, dir)?;
            println!("❌ Deleted file: {}", name.red());
        }
        Command::Stat(name) => {
            let stat = session.fs.stat(name, dir)?;
            println!(
                "{}\n{}: {}\n{}: {}\n{}: {} bytes in {} blocks\n{}: {}\n{}: {}\n",
                "📊 File Info".bright_yellow().bold(),
                "Name".blue(),
                stat.name,
                "Inode".blue(),
                stat.inode_number,
                "Size".blue(),
                stat.size,
                stat.blocks,
                "Created".blue(),
                format_timestamp(stat.created_at),
                "Modified".blue(),
                format_timestamp(stat.modified_at),
            );
        }
        Command::Df => {
            let usage = session.fs.usage()?;
            println!(
                "{}\n{}: {} / {} free ({} bytes each)\n{}: {} / {} free",
                "💾 Disk Usage".bright_yellow().bold(),
                "Blocks".blue(),
                usage.free_blocks,
                usage.total_blocks,
                usage.block_size,
                "Inodes".blue(),
                usage.free_inodes,
                usage.total_inodes,
            );
        }
        Command::Fsck => {
            let problems = session.fs.verify()?;
            if problems.is_empty() {
                println!("{}", "✅ File system is consistent".green());
            }
            for problem in problems {
                println!("{} {}", "⚠️ ".yellow(), problem);
            }
        }
        Command::Format => {
            let confirmed = Confirm::new()
                .with_prompt("Erase the whole virtual disk?")
                .default(false)
                .interact()?;
            if !confirmed {
                println!("{}", "Format cancelled.".bright_black());
                return Ok(());
            }

            let pb = ProgressBar::new_spinner();
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(Duration::from_millis(80));
            pb.set_message("Formatting virtual disk...");
            let super_block = session.fs.format()?;
            session.current_dir = super_block.root_inode;
            pb.finish_with_message(format!(
                "✅ Disk formatted successfully! (volume {})",
                super_block.volume_id
            ));
        }
        Command::Exit => println!("{}", "👋 Exiting MiniFS shell...".yellow().bold()),
    }

    Ok(())
}

fn content_or_prompt(content: &Option<String>) -> Result<String, Box<dyn Error>> {
    match content {
        Some(text) => Ok(text.clone()),
        None => Ok(Input::<String>::new()
            .with_prompt("Content")
            .allow_empty(true)
            .interact_text()?),
    }
}

fn print_help() {
    println!("{}", "📘 MiniFS Commands".bright_cyan().bold());
    println!(
        "{}",
        "
  ls                    List files in current directory
  pwd                   Print current path
  cd <dir>              Change directory (only / exists)
  whoami                Print current user
  open <file>           Open a file, creating it if missing
  read <file>           Read file content
  write <file> [text]   Replace file content
  append <file> [text]  Append to file content
  rm <file>             Remove file
  stat <file>           Show file info
  df                    Show free blocks and inodes
  fsck                  Check file system consistency
  format                Format virtual disk
  help                  Show this help message
  exit                  Quit the shell
"
        .bright_black()
    );
}
