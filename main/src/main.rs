// Enable some rust 2018 idioms.
#![warn(bare_trait_objects)]
#![warn(unused_extern_crates)]

#[macro_use]
extern crate log;

mod print;

use std::io::{BufWriter, Write};
use std::process;

use parser::{ImageFormat, MemoryImage};

// Mode
const OPT_FILE: &str = "file";

// Calibration image
const OPT_CALIBRATION: &str = "calibration";
const OPT_FORMAT: &str = "format";
const OPT_FORMAT_HEX: &str = "hex";
const OPT_FORMAT_BIN: &str = "bin";
const OPT_OUTPUT: &str = "output";

// Print categories
const OPT_CATEGORY: &str = "category";
const OPT_CATEGORY_ENTRY: &str = "entry";
const OPT_CATEGORY_VARIABLE: &str = "variable";

#[derive(Debug, Default)]
struct Options {
    path: String,
    calibration: Option<String>,
    format: ImageFormatOption,
    output: Option<String>,
    print_entries: bool,
    print_variables: bool,
}

#[derive(Debug, Clone, Copy)]
struct ImageFormatOption(ImageFormat);

impl Default for ImageFormatOption {
    fn default() -> Self {
        ImageFormatOption(ImageFormat::Hex)
    }
}

fn main() {
    env_logger::init();

    let cmd = clap::Command::new("calbin")
        .version(clap::crate_version!())
        .arg(
            clap::Arg::new(OPT_FILE)
                .help("Path of the binary to parse")
                .value_name("FILE")
                .index(1)
                .required(true),
        )
        .arg(
            clap::Arg::new(OPT_CALIBRATION)
                .short('m')
                .long(OPT_CALIBRATION)
                .help("Calibration image to load")
                .value_name("IMAGE"),
        )
        .arg(
            clap::Arg::new(OPT_FORMAT)
                .short('f')
                .long(OPT_FORMAT)
                .help("Format of the calibration image")
                .value_name("FORMAT")
                .value_parser([OPT_FORMAT_HEX, OPT_FORMAT_BIN])
                .default_value(OPT_FORMAT_HEX),
        )
        .arg(
            clap::Arg::new(OPT_OUTPUT)
                .short('o')
                .long(OPT_OUTPUT)
                .help("Re-encode the loaded calibration image to this path")
                .value_name("IMAGE")
                .requires(OPT_CALIBRATION),
        )
        .arg(
            clap::Arg::new(OPT_CATEGORY)
                .short('c')
                .long(OPT_CATEGORY)
                .help("Categories of output to print (defaults to variables)")
                .value_name("CATEGORY")
                .value_parser([OPT_CATEGORY_ENTRY, OPT_CATEGORY_VARIABLE])
                .action(clap::ArgAction::Append),
        );

    let matches = cmd.get_matches();

    let mut options = Options::default();
    options.path = matches
        .get_one::<String>(OPT_FILE)
        .expect("file is required")
        .clone();
    options.calibration = matches.get_one::<String>(OPT_CALIBRATION).cloned();
    options.output = matches.get_one::<String>(OPT_OUTPUT).cloned();
    if let Some(format) = matches.get_one::<String>(OPT_FORMAT) {
        options.format = ImageFormatOption(match format.as_str() {
            OPT_FORMAT_BIN => ImageFormat::Bin,
            _ => ImageFormat::Hex,
        });
    }
    match matches.get_many::<String>(OPT_CATEGORY) {
        Some(categories) => {
            for category in categories {
                match category.as_str() {
                    OPT_CATEGORY_ENTRY => options.print_entries = true,
                    OPT_CATEGORY_VARIABLE => options.print_variables = true,
                    _ => {}
                }
            }
        }
        None => options.print_variables = true,
    }

    if let Err(e) = run(&options) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(options: &Options) -> parser::Result<()> {
    let image = match &options.calibration {
        Some(path) => Some(MemoryImage::load(path, options.format.0)?),
        None => None,
    };

    parser::File::parse(&options.path, |file| {
        let stdout = std::io::stdout();
        let mut w = BufWriter::new(stdout.lock());
        if options.print_entries {
            print::entries(&mut w, file)?;
        }
        if options.print_variables {
            print::variables(&mut w, file, image.as_ref())?;
        }
        w.flush()?;
        Ok(())
    })?;

    if let (Some(image), Some(output)) = (&image, &options.output) {
        image.save(output)?;
        info!("saved calibration image to {}", output);
    }

    Ok(())
}
