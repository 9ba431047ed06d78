use cycompile::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use cycompile::cli::{Command, CycompileCli};
    use cycompile::profile::DirectiveValue;

    #[test]
    fn key_command_collects_directives_and_flags() {
        let cli = CycompileCli::parse_from([
            "cycompile",
            "key",
            "pkg/mod.py",
            "f",
            "--profile",
            "custom",
            "-X",
            "boundscheck=False",
            "--flag",
            "-O3",
            "--json",
        ]);
        match cli.command() {
            Command::Key {
                file,
                function,
                profile,
                directives,
                flags,
                json,
                ..
            } => {
                assert_eq!(file.to_string_lossy(), "pkg/mod.py");
                assert_eq!(function, "f");
                assert_eq!(profile, "custom");
                assert_eq!(
                    directives,
                    &vec![("boundscheck".to_string(), DirectiveValue::Bool(false))]
                );
                assert_eq!(flags, &vec!["-O3".to_string()]);
                assert!(*json);
            }
            other => panic!("expected key command, got {other:?}"),
        }
    }
}
