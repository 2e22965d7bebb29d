use crate::shell::command::Command;

pub fn parse_command(input: &str) -> Option<Command> {
    let tokens: Vec<&str> = input.split_ascii_whitespace().collect();
    let (&cmd, args) = tokens.split_first()?;

    // 写入内容取文件名之后的整行原文，缺省时由 shell 交互式询问
    let content = || Some(skip_tokens(input, 2).to_string()).filter(|rest| !rest.is_empty());

    match cmd {
        "help" => Some(Command::Help),
        "ls" => Some(Command::Ls),
        "pwd" => Some(Command::Pwd),
        "whoami" => Some(Command::Whoami),
        "cd" => Some(Command::Cd(args.first().unwrap_or(&"/").to_string())),
        "open" | "create" | "touch" => args.first().map(|&name| Command::Open(name.to_string())),
        "read" | "cat" => args.first().map(|&name| Command::Read(name.to_string())),
        "write" => args
            .first()
            .map(|&name| Command::Write(name.to_string(), content())),
        "append" => args
            .first()
            .map(|&name| Command::Append(name.to_string(), content())),
        "rm" | "unlink" => args.first().map(|&name| Command::Rm(name.to_string())),
        "stat" => args.first().map(|&name| Command::Stat(name.to_string())),
        "df" => Some(Command::Df),
        "fsck" => Some(Command::Fsck),
        "format" => Some(Command::Format),
        "exit" | "quit" => Some(Command::Exit),
        _ => None,
    }
}

// 跳过前 `count` 个以空白分隔的词，返回剩余部分（去掉开头的空白）
fn skip_tokens(input: &str, count: usize) -> &str {
    let mut rest = input.trim_start();
    for _ in 0..count {
        let end = rest
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(rest.len());
        rest = rest[end..].trim_start();
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_commands() {
        assert_eq!(parse_command("open a.txt"), Some(Command::Open("a.txt".into())));
        assert_eq!(parse_command("  cat   a.txt "), Some(Command::Read("a.txt".into())));
        assert_eq!(parse_command("rm a.txt"), Some(Command::Rm("a.txt".into())));
    }

    #[test]
    fn write_keeps_spaces_in_content() {
        assert_eq!(
            parse_command("write a.txt hello big world"),
            Some(Command::Write("a.txt".into(), Some("hello big world".into())))
        );
        assert_eq!(
            parse_command("append a.txt   two  spaces\tand a tab"),
            Some(Command::Append(
                "a.txt".into(),
                Some("two  spaces\tand a tab".into())
            ))
        );
        assert_eq!(
            parse_command("append a.txt"),
            Some(Command::Append("a.txt".into(), None))
        );
    }

    #[test]
    fn rejects_incomplete_or_unknown_input() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("read"), None);
        assert_eq!(parse_command("wirte a b"), None);
        assert_eq!(parse_command("cd"), Some(Command::Cd("/".into())));
    }
}
