fn main() {
    if let Err(err) = trip_etl::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
