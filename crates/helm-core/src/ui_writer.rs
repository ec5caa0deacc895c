//! Abstracts console output away from the agent loop so the loop itself
//! never touches stdout directly. A thin CLI wires a real implementation
//! in; tests and library callers use `NullUiWriter`.

pub trait UiWriter: Send + Sync {
    fn print(&self, message: &str);
    fn println(&self, message: &str);
    fn print_inline(&self, message: &str);

    fn print_tool_header(&self, tool_name: &str, tool_args: Option<&serde_json::Value>);
    fn print_tool_output_line(&self, line: &str);
    fn print_tool_timing(&self, duration_str: &str, tokens_delta: u32, context_percentage: f32);

    fn print_agent_response(&self, content: &str);
    fn print_context_status(&self, message: &str);

    fn flush(&self);
}

pub struct NullUiWriter;

impl UiWriter for NullUiWriter {
    fn print(&self, _message: &str) {}
    fn println(&self, _message: &str) {}
    fn print_inline(&self, _message: &str) {}
    fn print_tool_header(&self, _tool_name: &str, _tool_args: Option<&serde_json::Value>) {}
    fn print_tool_output_line(&self, _line: &str) {}
    fn print_tool_timing(&self, _duration_str: &str, _tokens_delta: u32, _context_percentage: f32) {}
    fn print_agent_response(&self, _content: &str) {}
    fn print_context_status(&self, _message: &str) {}
    fn flush(&self) {}
}
