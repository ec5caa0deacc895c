//! A minimal ANSI-colored terminal `UiWriter` (SPEC_FULL §4.2's loop is
//! UI-agnostic; this is the one thin concrete implementation wired in by
//! the CLI binary).

use std::io::{self, Write};

use helm_core::UiWriter;

mod ansi {
    pub const GREEN: &str = "\x1b[32m";
    pub const DIM: &str = "\x1b[2m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const RESET: &str = "\x1b[0m";
}

pub struct ConsoleUiWriter;

impl UiWriter for ConsoleUiWriter {
    fn print(&self, message: &str) {
        print!("{message}");
        let _ = io::stdout().flush();
    }

    fn println(&self, message: &str) {
        println!("{message}");
    }

    fn print_inline(&self, message: &str) {
        print!("{message}");
        let _ = io::stdout().flush();
    }

    fn print_tool_header(&self, tool_name: &str, tool_args: Option<&serde_json::Value>) {
        match tool_args {
            Some(args) => println!("\n{}▸ {tool_name}{} {args}", ansi::GREEN, ansi::RESET),
            None => println!("\n{}▸ {tool_name}{}", ansi::GREEN, ansi::RESET),
        }
    }

    fn print_tool_output_line(&self, line: &str) {
        println!("  {}{line}{}", ansi::DIM, ansi::RESET);
    }

    fn print_tool_timing(&self, duration_str: &str, tokens_delta: u32, context_percentage: f32) {
        println!(
            "  {}{duration_str} · +{tokens_delta} tok · {:.0}% context{}",
            ansi::DIM,
            context_percentage * 100.0,
            ansi::RESET
        );
    }

    fn print_agent_response(&self, content: &str) {
        println!("\n{content}\n");
    }

    fn print_context_status(&self, message: &str) {
        println!("{}{message}{}", ansi::YELLOW, ansi::RESET);
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
    }
}
