fn main() {
    if let Err(err) = xcforge::run() {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
