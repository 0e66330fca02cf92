fn main() {
    if let Err(err) = etl_data::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
