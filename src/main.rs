mod atoms;
mod client;
mod events;

use log::error;

use crate::client::Client;

fn main() {
    env_logger::Builder::new().parse_default_env().init();

    let mut client = match Client::connect() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("ERROR: Cannot open X connection: {}", e);
            std::process::exit(1);
        },
    };

    // past this point a broken connection ends the run like a closed
    // event stream would
    if let Err(e) = client.setup() {
        error!("connection lost during setup: {}", e);
        return;
    }

    if let Err(e) = client.run() {
        error!("couldn't write event output: {}", e);
    }
}
