//! Print (or serialize) IR to human and machine readable text.
//!
//! This module implements a small document based pretty-printer.  The output is always suitable
//! for [`crate::parser::parse`].

use std::collections::HashMap;

use crate::{
    block::Block,
    context::Context,
    function::Function,
    instruction::{BinaryOpKind, Callee, InstOp, Predicate},
    module::Module,
    pass_manager::{AnalysisResult, AnalysisResultT, AnalysisResults, Pass, ScopedPass},
    value::{Constant, Value, ValueDatum},
    IrError,
};

#[derive(Debug)]
pub(crate) enum Doc {
    Empty,
    Comma,

    Text(String),
    Line(Box<Doc>),

    Pair(Box<Doc>, Box<Doc>),

    List(Vec<Doc>),
    ListSep(Vec<Doc>, Box<Doc>),

    Parens(Box<Doc>),

    Indent(i64, Box<Doc>),
}

impl Doc {
    pub(crate) fn text<S: Into<String>>(s: S) -> Self {
        Doc::Text(s.into())
    }

    fn line(doc: Doc) -> Self {
        Doc::Line(Box::new(doc))
    }

    pub(crate) fn text_line<S: Into<String>>(s: S) -> Self {
        Doc::Line(Box::new(Doc::Text(s.into())))
    }

    fn indent(n: i64, doc: Doc) -> Doc {
        Doc::Indent(n, Box::new(doc))
    }

    fn list_sep(docs: Vec<Doc>, sep: Doc) -> Doc {
        Doc::ListSep(docs, Box::new(sep))
    }

    fn in_parens_comma_sep(docs: Vec<Doc>) -> Doc {
        Doc::Parens(Box::new(Doc::list_sep(docs, Doc::Comma)))
    }

    pub(crate) fn append(self, doc: Doc) -> Doc {
        match (&self, &doc) {
            (Doc::Empty, _) => doc,
            (_, Doc::Empty) => self,
            _ => Doc::Pair(Box::new(self), Box::new(doc)),
        }
    }

    pub(crate) fn build(self) -> String {
        build_doc(self, 0)
    }
}

/// Pretty-print a whole [`Context`] to a string.
pub fn to_string(context: &Context) -> String {
    context
        .module_iter()
        .fold(Doc::Empty, |doc, module| {
            doc.append(module_to_doc(context, module))
        })
        .build()
}

/// Pretty-print a single function to a string.
pub fn function_to_string(context: &Context, function: Function) -> String {
    function_to_doc(context, &mut Namer::new(function), function).build()
}

pub struct ModulePrinterResult;
impl AnalysisResultT for ModulePrinterResult {}

/// Pass to print a module to stdout.
pub fn module_printer_pass(
    context: &Context,
    _analyses: &AnalysisResults,
    module: Module,
) -> Result<AnalysisResult, IrError> {
    print!("{}", module_to_doc(context, module).build());
    Ok(Box::new(ModulePrinterResult))
}

pub const MODULE_PRINTER_NAME: &str = "module-printer";

pub fn create_module_printer_pass() -> Pass {
    Pass {
        name: MODULE_PRINTER_NAME,
        descr: "Print module to stdout",
        deps: vec![],
        runner: ScopedPass::ModulePass(Box::new(module_printer_pass)),
    }
}

fn module_to_doc(context: &Context, module: Module) -> Doc {
    Doc::line(Doc::text(format!("module {} {{", module.get_name(context))))
        .append(Doc::indent(4, Doc::List(module_items(context, module))))
        .append(Doc::text_line("}"))
}

/// Functions separated by blank lines.  Runs of declarations are kept together.
fn module_items(context: &Context, module: Module) -> Vec<Doc> {
    let mut items = Vec::new();
    let mut prev_is_declaration = None;
    for function in module.function_iter(context) {
        let is_declaration = function.is_declaration(context);
        if prev_is_declaration.is_some_and(|prev| !(prev && is_declaration)) {
            items.push(Doc::line(Doc::Empty));
        }
        items.push(function_to_doc(context, &mut Namer::new(function), function));
        prev_is_declaration = Some(is_declaration);
    }
    items
}

fn function_to_doc(context: &Context, namer: &mut Namer, function: Function) -> Doc {
    let mut params: Vec<Doc> = function
        .args_iter(context)
        .map(|(name, _)| Doc::text(name))
        .collect();
    if function.is_variadic(context) {
        params.push(Doc::text("..."));
    }
    let signature = Doc::text(format!("fn {}", function.get_name(context)))
        .append(Doc::in_parens_comma_sep(params));

    if function.is_declaration(context) {
        return Doc::line(Doc::text("declare ").append(signature));
    }

    Doc::line(signature.append(Doc::text(" {")))
        .append(Doc::list_sep(
            function
                .block_iter(context)
                .map(|block| block_to_doc(context, namer, &block))
                .collect(),
            Doc::line(Doc::Empty),
        ))
        .append(Doc::text_line("}"))
}

fn block_to_doc(context: &Context, namer: &mut Namer, block: &Block) -> Doc {
    Doc::text_line(format!("{}:", block.get_label(context))).append(Doc::indent(
        4,
        Doc::List(
            block
                .instruction_iter(context)
                .map(|ins_value| instruction_to_doc(context, namer, &ins_value))
                .collect(),
        ),
    ))
}

fn constant_to_string(constant: &Constant) -> String {
    match constant {
        Constant::Bool(b) => b.to_string(),
        Constant::Int(n) => n.to_string(),
        Constant::Null => "null".to_owned(),
        Constant::Undef => "undef".to_owned(),
    }
}

fn instruction_to_doc(context: &Context, namer: &mut Namer, ins_value: &Value) -> Doc {
    let Some(instruction) = ins_value.get_instruction(context) else {
        unreachable!("Unexpected non instruction for block contents.")
    };

    let mut opnd = |val: &Value| namer.name(context, val);
    let body = match &instruction.op {
        InstOp::Alloca => "alloca".to_owned(),
        InstOp::BinaryOp { op, arg1, arg2 } => {
            let op_str = match op {
                BinaryOpKind::Add => "add",
                BinaryOpKind::Sub => "sub",
                BinaryOpKind::Mul => "mul",
                BinaryOpKind::Div => "div",
                BinaryOpKind::And => "and",
                BinaryOpKind::Or => "or",
            };
            format!("{op_str} {}, {}", opnd(arg1), opnd(arg2))
        }
        InstOp::Branch(to_block) => format!("br {}", to_block.get_label(context)),
        InstOp::Call { callee, args } => {
            let callee_str = match callee {
                Callee::Direct(function) => function.get_name(context).to_owned(),
                Callee::Indirect(fn_ptr) => opnd(fn_ptr),
            };
            let args_str = args.iter().map(&mut opnd).collect::<Vec<_>>().join(", ");
            format!("call {callee_str}({args_str})")
        }
        InstOp::Cast(val) => format!("cast {}", opnd(val)),
        InstOp::Cmp(pred, lhs, rhs) => {
            let pred_str = match pred {
                Predicate::Equal => "eq",
                Predicate::NotEqual => "ne",
                Predicate::LessThan => "lt",
                Predicate::GreaterThan => "gt",
            };
            format!("cmp {pred_str} {}, {}", opnd(lhs), opnd(rhs))
        }
        InstOp::ConditionalBranch {
            cond_value,
            true_block,
            false_block,
        } => format!(
            "cbr {}, {}, {}",
            opnd(cond_value),
            true_block.get_label(context),
            false_block.get_label(context)
        ),
        InstOp::GetElemPtr { base, indices } => std::iter::once(format!("get_elem_ptr {}", opnd(base)))
            .chain(indices.iter().map(&mut opnd))
            .collect::<Vec<_>>()
            .join(", "),
        InstOp::Load(src) => format!("load {}", opnd(src)),
        InstOp::MemCopy {
            dst_val_ptr,
            src_val_ptr,
        } => format!("mem_copy {}, {}", opnd(dst_val_ptr), opnd(src_val_ptr)),
        InstOp::Nop => "nop".to_owned(),
        InstOp::Phi(incoming) => format!(
            "phi({})",
            incoming
                .iter()
                .map(|(block, val)| format!("{}: {}", block.get_label(context), opnd(val)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        InstOp::Ret(None) => "ret".to_owned(),
        InstOp::Ret(Some(val)) => format!("ret {}", opnd(val)),
        InstOp::Store {
            dst_val_ptr,
            stored_val,
        } => format!("store {} to {}", opnd(stored_val), opnd(dst_val_ptr)),
    };

    let assign = if produces_value(&instruction.op) {
        format!("{} = ", namer.name(context, ins_value))
    } else {
        String::new()
    };
    let line = instruction
        .line
        .map(|line| format!(", line {line}"))
        .unwrap_or_default();

    Doc::text_line(format!("{assign}{body}{line}"))
}

fn produces_value(op: &InstOp) -> bool {
    match op {
        InstOp::Alloca
        | InstOp::BinaryOp { .. }
        | InstOp::Call { .. }
        | InstOp::Cast(_)
        | InstOp::Cmp(..)
        | InstOp::GetElemPtr { .. }
        | InstOp::Load(_)
        | InstOp::Phi(_) => true,
        InstOp::Branch(_)
        | InstOp::ConditionalBranch { .. }
        | InstOp::MemCopy { .. }
        | InstOp::Nop
        | InstOp::Ret(_)
        | InstOp::Store { .. } => false,
    }
}

/// Gives every value used within a function a printable name.
///
/// Named values keep their name, constants print as literals, functions by their name and anything
/// else gets a fresh `_N` name, stable for the lifetime of the namer.
pub struct Namer {
    function: Function,
    names: HashMap<Value, String>,
    next_value_idx: u64,
}

impl Namer {
    pub fn new(function: Function) -> Self {
        Namer {
            function,
            names: HashMap::new(),
            next_value_idx: 0,
        }
    }

    /// The function whose values this namer names.
    pub fn function(&self) -> Function {
        self.function
    }

    pub fn name(&mut self, context: &Context, value: &Value) -> String {
        match &context.values[value.0].value {
            ValueDatum::Constant(c) => constant_to_string(c),
            ValueDatum::Function(func) => func.get_name(context).to_owned(),
            ValueDatum::Argument(_) | ValueDatum::Instruction(_) => match value.get_name(context) {
                Some(name) => name.to_owned(),
                None => self.default_name(value),
            },
        }
    }

    fn default_name(&mut self, value: &Value) -> String {
        self.names.get(value).cloned().unwrap_or_else(|| {
            let new_name = format!("_{}", self.next_value_idx);
            self.next_value_idx += 1;
            self.names.insert(*value, new_name.clone());
            new_name
        })
    }
}

/// There will be a much more efficient way to do this, but for now this will do.
fn build_doc(doc: Doc, indent: i64) -> String {
    match doc {
        Doc::Empty => "".into(),
        Doc::Comma => ", ".into(),

        Doc::Text(t) => t,
        Doc::Line(d) => {
            if matches!(*d, Doc::Empty) {
                "\n".into()
            } else {
                format!("{}{}\n", " ".repeat(indent as usize), build_doc(*d, indent))
            }
        }

        Doc::Pair(l, r) => [build_doc(*l, indent), build_doc(*r, indent)].concat(),

        Doc::List(v) => v
            .into_iter()
            .map(|d| build_doc(d, indent))
            .collect::<Vec<String>>()
            .concat(),
        Doc::ListSep(v, s) => v
            .into_iter()
            .filter_map(|d| match &d {
                Doc::Empty => None,
                Doc::List(vs) => {
                    if vs.is_empty() {
                        None
                    } else {
                        Some(build_doc(d, indent))
                    }
                }
                _ => Some(build_doc(d, indent)),
            })
            .collect::<Vec<String>>()
            .join(&build_doc(*s, indent)),

        Doc::Parens(d) => format!("({})", build_doc(*d, indent)),

        Doc::Indent(n, d) => build_doc(*d, indent + n),
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::parse;

    #[test]
    fn print_then_parse_is_stable() {
        let input = r"
            module m {
                declare fn printf(fmt, ...)
                fn f(x) {
                entry:
                    ret x
                }
                fn main() {
                entry:
                    p = alloca
                    store f to p
                    q = load p
                    r = call q(null), line 4
                    s = call printf(0, r)
                    ret
                }
            }";
        let printed = parse(input).unwrap().to_string();
        let reprinted = parse(&printed).unwrap().to_string();
        assert_eq!(printed, reprinted);
        assert!(printed.contains("    r = call q(null), line 4\n"));
        assert!(printed.contains("    declare fn printf(fmt, ...)\n"));
    }

    #[test]
    fn declarations_print_back_to_back() {
        let input = r"
            module m {
                declare fn malloc(size)
                declare fn free(p)
                fn main() {
                entry:
                    ret
                }
            }";
        let printed = parse(input).unwrap().to_string();
        assert!(printed.contains("    declare fn malloc(size)\n    declare fn free(p)\n\n    fn main() {\n"));
    }
}
