//! Shell command construction for the remote host.
//!
//! Everything here renders strings for `bash`; nothing is executed. Remote
//! paths keep `~` and `$VAR` expansion working, everything else is quoted.

/// Quote `value` as a single shell word.
///
/// Words made only of characters that need no quoting are returned as-is,
/// which keeps logged commands readable.
pub fn quote(value: &str) -> String {
    if !value.is_empty() && value.chars().all(is_plain) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Render a remote path so that a leading `~/` and `$VAR` references still expand.
pub fn path_arg(path: &str) -> String {
    if path == "~" {
        return "~".to_string();
    }
    match path.strip_prefix("~/") {
        Some(rest) if rest.is_empty() => "~/".to_string(),
        Some(rest) => format!("~/{}", expandable(rest)),
        None => expandable(path),
    }
}

fn expandable(value: &str) -> String {
    if !value.is_empty() && value.chars().all(is_plain) {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn is_plain(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '+' | ',' | '@' | '%')
}

pub fn which(command: &str) -> String {
    format!("which {}", quote(command))
}

pub fn test_exists(path: &str) -> String {
    format!("test -e {}", path_arg(path))
}

/// Succeeds if `path` contains `text` anywhere (fixed string).
pub fn grep_fixed(path: &str, text: &str) -> String {
    format!("grep -q -F -e {} {}", quote(text), path_arg(path))
}

/// Succeeds if `path` contains a line exactly equal to `line`.
pub fn grep_line(path: &str, line: &str) -> String {
    format!("grep -q -x -F -e {} {}", quote(line), path_arg(path))
}

/// Succeeds if `path` matches the extended regular expression `pattern`.
pub fn grep_extended(path: &str, pattern: &str) -> String {
    format!("grep -q -E -e {} {}", quote(pattern), path_arg(path))
}

/// Append `lines` to `path` in one write, one per line.
pub fn append_lines<S: AsRef<str>>(path: &str, lines: &[S]) -> String {
    let mut out = String::from("printf '%s\\n'");
    for line in lines {
        out.push(' ');
        out.push_str(&quote(line.as_ref()));
    }
    out.push_str(" >> ");
    out.push_str(&path_arg(path));
    out
}

/// Prefix every line that fully matches `pattern` with `#`, keeping a `.bak` copy.
///
/// `pattern` is an extended regex (GNU `sed -r`) and must not contain `/`.
pub fn comment_out(path: &str, pattern: &str) -> String {
    let script = format!(r"s/^({pattern})$/#\1/");
    format!("sed -i.bak -r -e {} {}", quote(&script), path_arg(path))
}

pub fn mkdir_p(path: &str) -> String {
    format!("mkdir -p {}", path_arg(path))
}

pub fn rm_rf(path: &str) -> String {
    format!("rm -Rf {}", path_arg(path))
}

pub fn bash_script(path: &str) -> String {
    format!("bash {}", path_arg(path))
}

pub fn apt_update(tool: &str) -> String {
    format!("{tool} -q update")
}

pub fn apt_install<S: AsRef<str>>(tool: &str, packages: &[S]) -> String {
    let mut line = format!("export DEBIAN_FRONTEND=noninteractive && {tool} install -y -q --force-yes");
    for package in packages {
        line.push(' ');
        line.push_str(&quote(package.as_ref()));
    }
    line
}

pub fn add_apt_repository(repo: &str) -> String {
    format!("add-apt-repository -y {}", quote(repo))
}

/// Wrap `command` for the remote login shell.
///
/// The command runs under `bash -l` so profile changes made by earlier
/// actions (PATH, `WORKON_HOME`) are visible. The `cd` happens before `sudo`,
/// so a `~` cwd is the login user's home. Inside an elevated command `~` may
/// be root's home; paths handed to `sudo` commands must be absolute.
pub fn wrap(command: &str, sudo: bool, cwd: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(dir) = cwd {
        out.push_str("cd ");
        out.push_str(&path_arg(dir));
        out.push_str(" && ");
    }
    if sudo {
        out.push_str("sudo -n ");
    }
    out.push_str("bash -l -c ");
    out.push_str(&quote(command));
    out
}

/// Arguments for `vagrant package` (without the leading `vagrant`).
pub fn vagrant_package_args(
    base: &str,
    output: &str,
    include: &[String],
    vagrantfile: &str,
    name: &str,
) -> Vec<String> {
    let mut args = vec![
        "package".to_string(),
        "--base".to_string(),
        base.to_string(),
        "--output".to_string(),
        output.to_string(),
    ];
    if !include.is_empty() {
        args.push("--include".to_string());
        args.push(include.join(","));
    }
    args.push("--vagrantfile".to_string());
    args.push(vagrantfile.to_string());
    args.push(name.to_string());
    args
}
