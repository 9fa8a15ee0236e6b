use clap::CommandFactory;
use clap_complete::aot::{generate, Shell};
use std::io::BufWriter;

fn completions_for(shell: Shell) -> String {
    let mut buf = BufWriter::new(Vec::new());
    generate(
        shell,
        &mut previewrig::cli::Cli::command(),
        "previewrig",
        &mut buf,
    );
    String::from_utf8(buf.into_inner().unwrap()).unwrap()
}

#[test]
fn completions_bash_generates_output() {
    let output = completions_for(Shell::Bash);
    assert!(!output.is_empty(), "bash completions should not be empty");
    assert!(
        output.contains("previewrig"),
        "bash completions should reference 'previewrig'"
    );
}

#[test]
fn completions_zsh_mentions_subcommands() {
    let output = completions_for(Shell::Zsh);
    for sub in ["start", "status", "destroy", "cleanup"] {
        assert!(output.contains(sub), "zsh completions should offer '{sub}'");
    }
}

#[test]
fn completions_fish_generates_output() {
    assert!(!completions_for(Shell::Fish).is_empty());
}
