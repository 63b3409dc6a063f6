fn main() {
    let args: Vec<String> = std::env::args().collect();
    if let Err(err) = skyplot::run(&args) {
        eprintln!("skyplot: {}", err);
        std::process::exit(1);
    }
}
