// Purpose: Provide default binary entry for the translator CLI.
// Inputs/Outputs: Reads process args and returns process exit code from CLI dispatcher.
// Invariants: Main must not bypass centralized CLI argument/diagnostic handling.
// Gotchas: Keep behavior aligned with the plc binary wrapper to avoid drift in user experience.

fn main() {
    let code = parlangc::cli::run_cli(std::env::args().skip(1));
    std::process::exit(code);
}
