use clap::{App, Arg};
use log::error;

use pyrite_asm::builder::Builder;
use pyrite_asm::lexer::Lexer;

fn main() {
    env_logger::init();
    let matches = App::new("pyrite_asm")
        .version("0.1")
        .about("Assembles score sources into a score binary")
        .arg(
            Arg::with_name("SOURCE")
                .value_name("FOLDER")
                .help("Folder of score source files to assemble")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("OUTPUT")
                .value_name("FILE")
                .help("Path of the score binary to write")
                .takes_value(true)
                .required(true),
        )
        .get_matches();
    let source_folder = matches.value_of("SOURCE").unwrap();
    let output_file = matches.value_of("OUTPUT").unwrap();

    let mut lexer = Lexer::new();
    if let Err(e) = lexer.lex_folder(source_folder) {
        error!("Error lexing folder '{}': {}", source_folder, e);
        std::process::exit(1);
    }

    let mut builder = Builder::new(lexer.tokens());
    if let Err(e) = builder.pass_one() {
        error!("Error running builder first pass: {}", e);
        std::process::exit(2);
    }

    if let Err(e) = builder.pass_two() {
        error!("Error running builder second pass: {}", e);
        std::process::exit(3);
    }

    if let Err(e) = builder.save(output_file) {
        error!("Error saving builder output to file '{}': {}", output_file, e);
        std::process::exit(4);
    }

    println!(
        "Assembled {} audio entries ({} bytes) into '{}'.",
        builder.audio_count(),
        builder.binary().len(),
        output_file
    );
}
