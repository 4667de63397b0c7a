//! Reconstructs indented, source-like text from one parsed [`Function`] by
//! simulating its stack machine (spec.md §4.6). The output is deliberately
//! lossy — it is not meant to round-trip back to bytecode.

use crate::error::Warning;
use crate::game::Game;

use super::{Constant, Function, OpCode};

const INDENT_UNIT: &str = "    ";

/// Decompile `function`, returning the rendered text plus any opcodes it
/// could not render. Unknown or unimplemented opcodes never abort the walk;
/// they're recorded as warnings and the line notes them inline.
pub fn decompile(function: &Function, game: Game) -> (String, Vec<Warning>) {
    let mut state = State::new(function, game);
    state.run();
    (state.result.join("\n"), state.warnings)
}

struct State<'f> {
    function: &'f Function,
    game: Game,
    result: Vec<String>,
    indent_level: i32,
    arguments: Vec<String>,
    reduce_indent_at_lines: Vec<u32>,
    indent_level_was_added: bool,
    table_start_argument_indexes: Vec<usize>,
    warnings: Vec<Warning>,
}

impl<'f> State<'f> {
    fn new(function: &'f Function, game: Game) -> Self {
        State {
            function,
            game,
            result: vec![format!(
                "function {}.{} [uid {}] {{",
                function.script_name, function.name, function.uid
            )],
            indent_level: 1,
            arguments: Vec::new(),
            reduce_indent_at_lines: Vec::new(),
            indent_level_was_added: false,
            table_start_argument_indexes: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn indent(&self) -> String {
        INDENT_UNIT.repeat(self.indent_level.max(0) as usize)
    }

    fn emit(&mut self, line: impl AsRef<str>) {
        let indent = self.indent();
        self.result.push(format!("{indent}{}", line.as_ref()));
    }

    fn reduce_indent(&mut self, closing: &str) {
        self.indent_level -= 1;
        self.emit(closing);
    }

    fn schedule_reduce_at_line(&mut self, line_number: u32) {
        if !self.reduce_indent_at_lines.contains(&line_number) {
            self.reduce_indent_at_lines.push(line_number);
        }
        self.indent_level += 1;
        self.indent_level_was_added = true;
    }

    fn warn(&mut self, opcode_number: u8) {
        tracing::warn!(game = ?self.game, opcode = opcode_number, "unresolved opcode in decompiler");
        self.warnings.push(Warning::UnknownOpcode {
            game: self.game,
            opcode: opcode_number,
        });
        self.emit(format!(
            "// unresolved opcode {opcode_number} (not yet implemented for this game)"
        ));
    }

    fn pop_last(&mut self, count: usize) -> Vec<String> {
        while self.arguments.len() < count {
            self.arguments.push("[[missing]]".to_string());
        }
        let split_at = self.arguments.len() - count;
        self.arguments.split_off(split_at)
    }

    fn push_variable_argument(&mut self, opcode: OpCode, p3: u32) {
        let mut argument = match self.function.constants.get(p3 as usize) {
            Some(Constant::String(s)) => {
                if opcode == OpCode::PushConst {
                    format!("\"{s}\"")
                } else {
                    s.clone()
                }
            }
            Some(Constant::Int(i)) => i.to_string(),
            Some(Constant::Float(f)) => f.to_string(),
            None => format!("[[invalid constant index {p3}]]"),
        };
        if opcode == OpCode::PushFunction {
            argument = format!("function {argument}");
        }
        self.arguments.push(argument);
    }

    fn run(&mut self) {
        for line in self.function.lines.clone() {
            let mut reduce_at_operation_indexes: Vec<usize> = Vec::new();
            self.indent_level_was_added = false;
            let slice =
                &self.function.instructions[line.start_index..line.end_index.min(self.function.instructions.len())];

            for (operation_index, instruction) in slice.iter().enumerate() {
                self.indent_level_was_added = false;
                let opcode = instruction.opcode(self.game);
                let p1 = instruction.p1();
                let p3 = instruction.p3();

                use OpCode::*;
                match opcode {
                    PushVar | PushConst | PushLocal | PushFunction | PushGlobal | PushUpvar
                    | PushVarRef | PushLocalRef | PushGlobalRef => {
                        self.push_variable_argument(opcode, p3);
                    }
                    PushNull => self.arguments.push("null".to_string()),
                    Index => {
                        let name = self.function.constant_display(p3 as usize);
                        if self.arguments.is_empty() {
                            self.warn(instruction.opcode_number());
                        } else {
                            let last = self.arguments.last_mut().unwrap();
                            if *last == name {
                                *last = format!("[this].{name}");
                            } else {
                                last.push('.');
                                last.push_str(&name);
                            }
                        }
                    }
                    NewArray => {
                        let size = match self.function.constants.get(p3 as usize) {
                            Some(Constant::Int(i)) => Some(*i as usize),
                            _ => None,
                        };
                        match size {
                            Some(size) if size <= self.arguments.len() => {
                                let items = self.pop_last(size);
                                self.arguments.push(format!("[ {} ]", items.join(", ")));
                            }
                            _ => self.warn(instruction.opcode_number()),
                        }
                    }
                    NewTable => match p3 {
                        0 => self.table_start_argument_indexes.push(self.arguments.len()),
                        1 => {
                            if let Some(start) = self.table_start_argument_indexes.pop() {
                                let items: Vec<String> = self.arguments.split_off(start);
                                self.arguments.push(format!("{{ {} }}", items.join(", ")));
                            } else {
                                self.warn(instruction.opcode_number());
                            }
                        }
                        _ => self.warn(instruction.opcode_number()),
                    },
                    NewSlot => {
                        let slot_name = self.function.constant_display(p3 as usize);
                        if self.arguments.is_empty() {
                            self.arguments.push(format!("{slot_name} = [[missing]]"));
                        } else {
                            let value = self.arguments.pop().unwrap();
                            self.arguments.push(format!("{slot_name} = {value}"));
                        }
                    }
                    Call | Fcall => {
                        let callee = self.arguments.pop().unwrap_or_else(|| "[[callNameMissing]]".to_string());
                        let argument_string = if p3 == 0 {
                            String::new()
                        } else if opcode == Fcall {
                            self.pop_last(p3 as usize).join(", ")
                        } else {
                            let joined = self.arguments.join(", ");
                            self.arguments.clear();
                            joined
                        };
                        let call_string = format!("{callee}({argument_string})");
                        if opcode == Fcall {
                            self.arguments.push(call_string);
                        } else {
                            self.emit(call_string);
                        }
                    }
                    StoreRoot | StoreUpvar | StoreLocal => {
                        let varname = self.function.constant_display(p3 as usize);
                        let value = self.arguments.pop().unwrap_or_else(|| "[[unset]]".to_string());
                        self.emit(format!("{varname} = {value}"));
                    }
                    StoreIndexed => {
                        let popped = self.pop_last(3);
                        let (value, container, index) = (&popped[0], &popped[1], &popped[2]);
                        self.emit(format!("{container}[{index}] <- {value}"));
                    }
                    NewThisSlot => {
                        let popped = self.pop_last(2);
                        let var_name = &popped[0];
                        let slot_name = popped[1].trim_matches('"');
                        self.emit(format!("{slot_name} <- {var_name}"));
                    }
                    IncRef => {
                        let var = self.pop_last(1).remove(0);
                        self.emit(format!("{var}++"));
                    }
                    JumpTrue | JumpFalse | JumpTopTrue | JumpTopFalse => {
                        if self.arguments.is_empty() {
                            self.warn(instruction.opcode_number());
                        } else {
                            let jump_distance = p1 & 0x3FFF;
                            let negation = if matches!(opcode, JumpTrue | JumpTopTrue) { "! " } else { "" };
                            if matches!(opcode, JumpTopTrue | JumpTopFalse) {
                                self.arguments.push(if opcode == JumpTopTrue { " || ".to_string() } else { " && ".to_string() });
                            } else {
                                let condition = self.arguments.join(" ");
                                let mut result_string = format!("if ({negation}{condition}) {{");
                                if jump_distance == 0 {
                                    result_string.push_str(" return }");
                                }
                                if self.result.last().map(|l| l.ends_with("} else {")).unwrap_or(false) {
                                    self.result.pop();
                                    self.reduce_indent(&format!("}} else {result_string}"));
                                } else {
                                    self.emit(result_string);
                                }
                                if jump_distance > 0 {
                                    if slice.len() == 1 {
                                        self.schedule_reduce_at_line(line.line_number);
                                    } else {
                                        reduce_at_operation_indexes
                                            .push(operation_index + jump_distance as usize + 1);
                                        self.indent_level += 1;
                                    }
                                }
                                self.arguments.clear();
                            }
                        }
                    }
                    Jump => {
                        self.reduce_indent("} else {");
                        self.schedule_reduce_at_line(line.line_number);
                        if !self.arguments.is_empty() {
                            self.warn(instruction.opcode_number());
                            self.arguments.clear();
                        }
                    }
                    Unot => {
                        if self.arguments.is_empty() {
                            self.warn(instruction.opcode_number());
                        } else {
                            let top = self.arguments.last_mut().unwrap();
                            if top.contains(' ') {
                                *top = format!("!({top} )");
                            } else {
                                *top = format!("!{top}");
                            }
                        }
                    }
                    Return => {
                        let joined = self.arguments.join(", ");
                        self.emit(format!("return {joined}"));
                        self.arguments.clear();
                    }
                    Eqeq | Neq | Lt | Leq | Geq | Gt | In if self.game == Game::Delores => {
                        let popped = self.pop_last(2);
                        let operator = comparison_operator(opcode);
                        self.arguments.push(format!("{} {operator} {}", popped[0], popped[1]));
                    }
                    Add if self.game == Game::Delores => {
                        let popped = self.pop_last(2);
                        self.arguments.push(format!("{} + {}", popped[0], popped[1]));
                    }
                    NullLocal if self.game == Game::ReturnToMonkeyIsland => {
                        let var = self.function.constant_display(p3 as usize);
                        self.emit(format!("{var} <- null"));
                    }
                    Math if self.game == Game::ReturnToMonkeyIsland => {
                        if let Some(super::opcodes::MathSubOp::Equals) = super::opcodes::rtmi_math_sub_op(p3) {
                            let popped = self.pop_last(2);
                            self.arguments = vec![format!("{} == {}", popped[0], popped[1])];
                        } else {
                            self.warn(instruction.opcode_number());
                        }
                    }
                    _ => self.warn(instruction.opcode_number()),
                }

                if reduce_at_operation_indexes.contains(&operation_index) {
                    if !self.indent_level_was_added {
                        self.reduce_indent("}");
                    }
                    reduce_at_operation_indexes.retain(|&i| i != operation_index);
                }
            }

            if self.reduce_indent_at_lines.contains(&line.line_number) && !self.indent_level_was_added {
                self.reduce_indent("}");
                self.reduce_indent_at_lines.retain(|&n| n != line.line_number);
            }
        }

        if !self.arguments.is_empty() {
            let joined = self.arguments.join(", ");
            self.emit(format!("return {joined}"));
        }
        self.reduce_indent("} [end function]");
    }
}

fn comparison_operator(opcode: OpCode) -> &'static str {
    match opcode {
        OpCode::Eqeq => "==",
        OpCode::Neq => "!=",
        OpCode::Lt => "<",
        OpCode::Leq => "<=",
        OpCode::Geq => ">=",
        OpCode::Gt => ">",
        OpCode::In => "IN",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Function, Instruction, LineRange};

    fn function_with(instructions: Vec<Instruction>, constants: Vec<Constant>) -> Function {
        let count = instructions.len();
        Function {
            uid: "uid".to_string(),
            name: "main".to_string(),
            script_name: "Boot".to_string(),
            info_extra: Vec::new(),
            strings: Vec::new(),
            constants,
            instructions,
            lines: vec![LineRange {
                line_number: 1,
                start_index: 0,
                end_index: count,
            }],
        }
    }

    fn instr(opcode_number: u8, p3: u32) -> Instruction {
        Instruction {
            word: opcode_number as u32 | (p3 << 23),
        }
    }

    #[test]
    fn s4_push_const_then_call_emits_call_line() {
        // RTMI opcode numbers: PUSH_CONST=1, CALL=23.
        let function = function_with(
            vec![instr(1, 0), instr(23, 1)],
            vec![Constant::String("ping".to_string())],
        );
        let (output, warnings) = decompile(&function, Game::ReturnToMonkeyIsland);
        assert!(warnings.is_empty());
        assert!(output.contains("\"ping\"()"), "output was:\n{output}");
    }

    #[test]
    fn unknown_opcode_is_warned_not_fatal() {
        let function = function_with(vec![Instruction { word: 63 }], Vec::new());
        let (output, warnings) = decompile(&function, Game::Delores);
        assert_eq!(warnings.len(), 1);
        assert!(output.contains("unresolved opcode"));
    }

    #[test]
    fn delores_equality_renders_infix_operator() {
        // PUSH_CONST, PUSH_CONST, EQEQ (24).
        let function = function_with(
            vec![instr(1, 0), instr(1, 1), instr(24, 0)],
            vec![Constant::Int(1), Constant::Int(2)],
        );
        let (output, warnings) = decompile(&function, Game::Delores);
        assert!(warnings.is_empty());
        assert!(output.contains("1 == 2"), "output was:\n{output}");
    }
}
