fn main() {
    if let Err(err) = survey_analyzer::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
