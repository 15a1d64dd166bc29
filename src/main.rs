use royal100::uci::protocol;

fn main() {
    royal100::init();

    // Arguments form a single command (e.g. `royal100 bench`); without any
    // the engine speaks UCI on stdin.
    let args: Vec<String> = std::env::args().skip(1).collect();
    protocol::run_uci(&args.join(" "));
}
