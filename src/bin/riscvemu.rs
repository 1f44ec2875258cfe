//! The debugger shell binary (§11): loads an ELF image, builds a
//! [`Machine`], and either runs it straight through (`--batch`) or
//! drives an interactive `rustyline` REPL over [`monitor::dispatch`].

use clap::Parser;
use clap_num::maybe_hex;
use tracing_subscriber::EnvFilter;

use riscvemu::elf_utils::load_elf;
use riscvemu::machine::{HaltReason, Machine};
use riscvemu::monitor::{self, DispatchOutcome};

/// A RISC-V (RV32IM) instruction-set emulator and source-level debugger.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to an ELF image to load into guest memory
    image: String,

    /// Run in batch mode: execute to completion without an interactive prompt
    #[arg(short, long)]
    batch: bool,

    /// Enable differential testing against a second, independently
    /// stepped reference core loaded with the same image
    #[arg(short = 'd', long)]
    difftest: bool,

    /// Entry PC override (defaults to the ELF entry point); accepts a
    /// 0x-prefixed hex literal or a decimal one
    #[arg(long, value_parser=maybe_hex::<u32>)]
    entry: Option<u32>,

    /// Emit step-by-step fetch/decode/execute narration via `tracing`
    #[arg(long)]
    verbose: bool,
}

fn build_machine(args: &Args) -> Result<Machine, Box<dyn std::error::Error>> {
    let mut machine = Machine::new();
    let entry = load_elf(&args.image, &mut machine.mem)?;
    machine.pc = args.entry.unwrap_or(entry);

    if args.difftest {
        let mut reference = Machine::new();
        let ref_entry = load_elf(&args.image, &mut reference.mem)?;
        reference.pc = args.entry.unwrap_or(ref_entry);
        machine = machine.with_reference(Box::new(reference));
    }

    Ok(machine)
}

/// Non-zero exactly when the machine halted in a state that is not a
/// clean `q` or a successful `ebreak` (§6's CLI surface contract).
fn exit_code_for(halt: Option<&HaltReason>) -> i32 {
    match halt {
        None | Some(HaltReason::EbreakSuccess) => 0,
        Some(_) => 1,
    }
}

fn main() -> std::process::ExitCode {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive(
                "riscvemu=trace".parse().expect("valid default directive"),
            ))
            .init();
    }

    let mut machine = match build_machine(&args) {
        Ok(machine) => machine,
        Err(err) => {
            eprintln!("riscvemu: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    if args.batch {
        monitor::dispatch(&mut machine, "c");
        return std::process::ExitCode::from(exit_code_for(machine.halted.as_ref()) as u8);
    }

    let mut editor = match rustyline::DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("riscvemu: could not start line editor: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    loop {
        match editor.readline("(riscvemu) ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                if monitor::dispatch(&mut machine, &line) == DispatchOutcome::Exit {
                    break;
                }
            }
            Err(_) => break, // Ctrl-D / Ctrl-C / read error: exit the REPL
        }
    }

    std::process::ExitCode::from(exit_code_for(machine.halted.as_ref()) as u8)
}
