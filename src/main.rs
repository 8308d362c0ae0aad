fn main() {
    if let Err(err) = apitap::cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
