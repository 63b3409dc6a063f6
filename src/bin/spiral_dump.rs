use skyplot::{GridCoordinate, SpiralSequencer};

fn parse_arg(args: &[String], index: usize, label: &str, default: i64) -> Result<i64, String> {
    match args.get(index) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("{} must be an integer, got '{}'", label, value)),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let parsed = parse_arg(&args, 1, "spacing", 1)
        .and_then(|spacing| parse_arg(&args, 2, "count", 49).map(|count| (spacing, count)));
    let (spacing, count) = match parsed {
        Ok(values) => values,
        Err(err) => {
            eprintln!("usage: spiral_dump [spacing] [count]: {}", err);
            std::process::exit(1);
        }
    };
    if spacing <= 0 || spacing > i64::from(i32::MAX) {
        eprintln!("spiral_dump: spacing must be a positive i32, got {}", spacing);
        std::process::exit(1);
    }

    let spiral = SpiralSequencer::new(spacing as i32);
    let mut current = GridCoordinate::ORIGIN;
    for _ in 0..count.max(0) {
        current = spiral.next_after(current);
        println!("{};{}", current.x, current.z);
    }
}
