use clap::Arg;

pub struct App {
    input_paths: Vec<String>,
    broker: String,
    summary_path: String,
    details_path: String,
    conf_path: String,
    explicit_conf: bool,
    verbose: bool,
}

impl App {
    pub fn new() -> App {
        let matches = clap::App::new("capital_tax")
            .version("0.1.0")
            .about("Processes equity trade statements into FIFO capital gains statements")
            .arg(Arg::with_name("input_path")
                .short("i")
                .long("input")
                .takes_value(true)
                .multiple(true)
                .required(true)
                .help("Broker statement(s) to process as one batch"))
            .arg(Arg::with_name("broker")
                .short("b")
                .long("broker")
                .takes_value(true)
                .possible_values(&["stake", "webull"])
                .help("Format of the broker statements"))
            .arg(Arg::with_name("summary_path")
                .short("s")
                .long("summary")
                .takes_value(true)
                .help("Financial year summary to write"))
            .arg(Arg::with_name("details_path")
                .short("d")
                .long("details")
                .takes_value(true)
                .help("Sale by sale breakdown to write"))
            .arg(Arg::with_name("config_path")
                .short("c")
                .long("config")
                .takes_value(true)
                .help("Config file"))
            .arg(Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .takes_value(false)
                .help("Logs every matched parcel"))
            .get_matches();

        App {
            input_paths: matches.values_of("input_path")
                .map(|values| values.map(str::to_string).collect())
                .unwrap_or_default(),
            broker: matches.value_of("broker")
                .unwrap_or("stake")
                .to_string(),
            summary_path: matches.value_of("summary_path")
                .unwrap_or("summary.csv")
                .to_string(),
            details_path: matches.value_of("details_path")
                .unwrap_or("details.csv")
                .to_string(),
            conf_path: matches.value_of("config_path")
                .unwrap_or("config.yaml")
                .to_string(),
            explicit_conf: matches.is_present("config_path"),
            verbose: matches.is_present("verbose"),
        }
    }

    pub fn get_input_paths(&self) -> &[String] { &self.input_paths }
    pub fn get_broker(&self) -> &str { &self.broker }
    pub fn get_summary_path(&self) -> &str { &self.summary_path }
    pub fn get_details_path(&self) -> &str { &self.details_path }
    pub fn get_config_path(&self) -> &str { &self.conf_path }
    pub fn is_config_explicit(&self) -> bool { self.explicit_conf }
    pub fn is_verbose(&self) -> bool { self.verbose }
}
