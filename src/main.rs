fn main() {
    if let Err(err) = gesturegate_lib::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
