//! Installs executable entries into `node_modules/.bin`.
//!
//! On Unix a shim is a relative symlink to the target executable. On
//! Windows, where symlinks need privileges and scripts need an
//! interpreter, a trio of stubs is written instead (`.cmd` for cmd.exe,
//! `.ps1` for PowerShell, and an extensionless sh script for MinGW-style
//! shells), with the interpreter taken from the target's shebang line.

use std::path::Path;

/// Installs a shim at `to` invoking the executable at `from`, replacing
/// whatever may already sit at the shim path.
pub fn shim_bin(from: &Path, to: &Path) -> std::io::Result<()> {
    let relative = pathdiff::diff_paths(from, to.parent().expect("shim path always has a parent"))
        .expect("shim source and destination are both absolute");
    remove_entry(to)?;
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(relative, to)
    }
    #[cfg(windows)]
    {
        remove_entry(&to.with_extension("cmd"))?;
        remove_entry(&to.with_extension("ps1"))?;
        let shebang = windows::read_shebang(from);
        windows::write_stubs(&relative, to, shebang.as_ref())
    }
}

fn remove_entry(path: &Path) -> std::io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(_) => Ok(()),
    }
}

#[cfg(windows)]
mod windows {
    use std::path::Path;

    use once_cell::sync::Lazy;
    use regex::Regex;

    static SHEBANG: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^#!\s*(?:/usr/bin/env\s+(?:-S\s+)?)?(?P<prog>[^ \t]+)(?P<args>.*)$")
            .expect("shebang pattern is well-formed")
    });

    pub(crate) struct Shebang {
        prog: String,
        args: String,
    }

    /// The interpreter named by the target's first line, if any.
    pub(crate) fn read_shebang(from: &Path) -> Option<Shebang> {
        let contents = std::fs::read_to_string(from).ok()?;
        let first_line = contents.lines().next()?;
        let captures = SHEBANG.captures(first_line.trim_end())?;
        let prog = captures.name("prog")?.as_str();
        let prog = prog.rsplit(['/', '\\']).next().unwrap_or(prog);
        Some(Shebang {
            prog: prog.to_owned(),
            args: captures
                .name("args")
                .map(|args| args.as_str().trim().to_owned())
                .unwrap_or_default(),
        })
    }

    pub(crate) fn write_stubs(
        from: &Path,
        to: &Path,
        shebang: Option<&Shebang>,
    ) -> std::io::Result<()> {
        write_cmd_stub(from, to, shebang)?;
        write_sh_stub(from, to, shebang)?;
        write_ps1_stub(from, to, shebang)?;
        Ok(())
    }

    fn write_cmd_stub(from: &Path, to: &Path, shebang: Option<&Shebang>) -> std::io::Result<()> {
        let target = from.display().to_string().replace('/', "\\");
        let mut cmd = String::from("@ECHO off\r\nSETLOCAL\r\nSET \"dp0=%~dp0\"\r\n");
        if let Some(Shebang { prog, args }) = shebang {
            cmd.push_str(&format!(
                "IF EXIST \"%dp0%\\{prog}.exe\" (\r\n  SET \"_prog=%dp0%\\{prog}.exe\"\r\n) ELSE (\r\n  SET \"_prog={prog}\"\r\n)\r\n"
            ));
            cmd.push_str(&format!("\"%_prog%\" {args} \"%dp0%\\{target}\" %*\r\n"));
        } else {
            cmd.push_str(&format!("\"%dp0%\\{target}\" %*\r\n"));
        }
        std::fs::write(to.with_extension("cmd"), cmd)
    }

    fn write_sh_stub(from: &Path, to: &Path, shebang: Option<&Shebang>) -> std::io::Result<()> {
        let target = from.display().to_string().replace('\\', "/");
        let mut sh = String::from(
            "#!/bin/sh\nbasedir=$(dirname \"$(echo \"$0\" | sed -e 's,\\\\,/,g')\")\n\n",
        );
        if let Some(Shebang { prog, args }) = shebang {
            sh.push_str(&format!(
                "if [ -x \"$basedir/{prog}\" ]; then\n  exec \"$basedir/{prog}\" {args} \"$basedir/{target}\" \"$@\"\nelse\n  exec {prog} {args} \"$basedir/{target}\" \"$@\"\nfi\n"
            ));
        } else {
            sh.push_str(&format!("exec \"$basedir/{target}\" \"$@\"\n"));
        }
        std::fs::write(to, sh)
    }

    fn write_ps1_stub(from: &Path, to: &Path, shebang: Option<&Shebang>) -> std::io::Result<()> {
        let target = from.display().to_string().replace('\\', "/");
        let mut pwsh = String::from(
            "#!/usr/bin/env pwsh\n$basedir=Split-Path $MyInvocation.MyCommand.Definition -Parent\n\n",
        );
        if let Some(Shebang { prog, args }) = shebang {
            pwsh.push_str(&format!(
                "if (Test-Path \"$basedir/{prog}.exe\") {{\n  & \"$basedir/{prog}.exe\" {args} \"$basedir/{target}\" $args\n}} else {{\n  & {prog} {args} \"$basedir/{target}\" $args\n}}\n"
            ));
        } else {
            pwsh.push_str(&format!("& \"$basedir/{target}\" $args\n"));
        }
        pwsh.push_str("exit $LASTEXITCODE\n");
        std::fs::write(to.with_extension("ps1"), pwsh)
    }
}
