use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    chatweb::cli::main()
}
