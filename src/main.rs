use std::process;

use ntp_probe::configuration::{Configuration, Parser, EXIT_INVALID_CONFIGURATION};
use ntp_probe::measurement::measure;
use ntp_probe::report::render;
use ntp_probe::scan::scan_all_versions;

#[tokio::main]
async fn main() {
    env_logger::init();

    let conf = Configuration::parse();
    if let Err(e) = conf.validate() {
        eprintln!("Error: {}", e);
        process::exit(EXIT_INVALID_CONFIGURATION);
    }

    log::info!("Configuration valid. Measuring {}", conf.host);
    let opts = conf.measure_options();

    let code = match conf.mode.version() {
        Some(version) => {
            let probe = measure(&conf.host, version, &opts).await;
            if conf.debug {
                print!("{}", probe.debug_log);
            }
            let code = probe.code();
            match probe.outcome {
                Ok(result) => println!("{}", render(&result, conf.output)),
                Err(e) => println!("{}", e),
            }
            code
        }
        None => {
            let report = scan_all_versions(&conf.host, &opts).await;
            if conf.debug {
                print!("{}", report.debug_log);
            }
            println!("{}", render(&report, conf.output));
            report.code()
        }
    };

    process::exit(code);
}
