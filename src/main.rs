mod cli;

use std::process;

use log::error;

use cli::{ERR_COMPILE, Options};

fn main() {
  let matches = cli::configure_cli().get_matches();
  let options = Options::from_matches(&matches);

  if let Some(path) = &options.log_file
    && let Err(err) = cli::configure_logging(path, options.log_level)
  {
    eprintln!("{err}");
    process::exit(ERR_COMPILE);
  }

  let asm = match rcc9::generate_assembly(&options.source) {
    Ok(asm) => asm,
    Err(err) => {
      error!("compilation failed at byte {}: {}", err.loc(), err.message());
      eprintln!("{err}");
      process::exit(ERR_COMPILE);
    }
  };

  match &options.output {
    Some(path) => {
      if let Err(err) = cli::write_output(path, &asm) {
        eprintln!("{err}");
        process::exit(ERR_COMPILE);
      }
    }
    None => print!("{asm}"),
  }
}
