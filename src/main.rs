// f83 main program

mod config;
mod repl;

use config::Config;

fn main() {
    env_logger::init();

    let mut config = Config::new();
    config.process_args();

    if config.run {
        config.run_forth();
    }
}
