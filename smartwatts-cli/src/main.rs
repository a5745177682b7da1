use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};

use anyhow::Context;
use clap::Parser;
use log::{info, warn};

use cli::Cli;
use smartwatts_formula::report::InputReport;
use smartwatts_formula::{CpuTopology, FormulaConfig, FormulaEngine, FormulaScope};

mod cli;

fn main() -> anyhow::Result<()> {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let cli = Cli::parse();

    let cpu_topology = CpuTopology::new(cli.tdp_watts, cli.base_clock_mhz, cli.ratio_min_mhz, cli.ratio_base_mhz, cli.ratio_max_mhz)
        .context("building CPU topology")?;

    let config = FormulaConfig {
        rapl_event: cli.rapl_event,
        min_samples_required: cli.min_samples_required,
        history_window_size: cli.history_window_size,
        cpu_topology,
        scope: FormulaScope::Cpu,
        real_time_mode: cli.real_time,
        error_threshold: cli.error_threshold,
        reports_frequency_seconds: cli.reports_frequency_seconds,
        socket_domain_value: cli.socket,
    };
    let mut engine = FormulaEngine::new(config);

    let reader: Box<dyn BufRead> = match &cli.input {
        Some(path) => Box::new(BufReader::new(File::open(path).with_context(|| format!("opening input file {path}"))?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let mut writer: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| format!("creating output file {path}"))?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let mut reports_in = 0u64;
    let mut reports_out = 0u64;

    for line in reader.lines() {
        let line = line.context("reading input line")?;
        if line.trim().is_empty() {
            continue;
        }
        let report: InputReport = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping malformed input line: {e}");
                continue;
            }
        };
        reports_in += 1;

        for output in engine.process(report) {
            write_output(&mut writer, &output)?;
            reports_out += 1;
        }
    }

    for output in engine.flush() {
        write_output(&mut writer, &output)?;
        reports_out += 1;
    }

    writer.flush().context("flushing output")?;
    info!("processed {reports_in} input reports, emitted {reports_out} output reports");

    Ok(())
}

fn write_output(writer: &mut dyn Write, output: &smartwatts_formula::OutputReport) -> anyhow::Result<()> {
    let line = serde_json::to_string(output).context("serializing output report")?;
    writeln!(writer, "{line}").context("writing output line")
}
