//! A parser for the printed IR, used by the tests and the `pta` tool.

use crate::{context::Context, error::IrError};

// -------------------------------------------------------------------------------------------------
/// Parse a string produced by [`crate::printer::to_string`] (or written by hand) into a new
/// [`Context`].
///
/// The result is verified before being returned.
pub fn parse(input: &str) -> Result<Context, IrError> {
    let irmod = ir_builder::parser::ir_descrs(input).map_err(|err| {
        let rest = input.get(err.location.offset..).unwrap_or_default();
        let found: String = rest.chars().take(20).collect();
        IrError::ParseFailure(err.to_string(), found)
    })?;
    let ir = ir_builder::build_context(irmod)?;
    ir.verify()
}

// -------------------------------------------------------------------------------------------------

mod ir_builder {
    peg::parser! {
        pub(in crate::parser) grammar parser() for str {
            use peg::ParseLiteral;

            pub(in crate::parser) rule ir_descrs() -> IrAstModule
                = _ m:module() eoi() {
                    m
                }

            rule module() -> IrAstModule
                = kw("module") name:id() "{" _ fn_decls:fn_item()* "}" _ {
                    IrAstModule {
                        name,
                        fn_decls,
                    }
                }

            rule fn_item() -> IrAstFnDecl
                = fn_declare()
                / fn_decl()

            rule fn_declare() -> IrAstFnDecl
                = kw("declare") kw("fn") name:id() "(" _ args:(id() ** comma()) is_variadic:variadic() ")" _ {
                    IrAstFnDecl {
                        name,
                        args,
                        is_declaration: true,
                        is_variadic,
                        blocks: Vec::new(),
                    }
                }

            rule variadic() -> bool
                = comma()? "..." _ { true }
                / "" { false }

            rule fn_decl() -> IrAstFnDecl
                = kw("fn") name:id() "(" _ args:(id() ** comma()) ")" _ "{" _
                    blocks:block_decl()*
                  "}" _ {
                    IrAstFnDecl {
                        name,
                        args,
                        is_declaration: false,
                        is_variadic: false,
                        blocks,
                    }
                }

            rule block_decl() -> IrAstBlock
                = label:id() ":" _ instructions:instr_decl()* {
                    IrAstBlock {
                        label,
                        instructions,
                    }
                }

            rule instr_decl() -> IrAstInstruction
                = !(id() ":") value_name:value_assign()? op:operation() line:comma_line()? {
                    IrAstInstruction {
                        value_name,
                        op,
                        line,
                    }
                }

            rule value_assign() -> String
                = name:id() "=" _ {
                    name
                }

            rule comma_line() -> u32
                = "," _ kw("line") l:decimal() {?
                    u32::try_from(l).or(Err("line"))
                }

            rule operation() -> IrAstOperation
                = op_alloca()
                / op_binary()
                / op_branch()
                / op_call()
                / op_cast()
                / op_cbr()
                / op_cmp()
                / op_get_elem_ptr()
                / op_load()
                / op_mem_copy()
                / op_nop()
                / op_phi()
                / op_ret()
                / op_store()

            rule op_alloca() -> IrAstOperation
                = kw("alloca") {
                    IrAstOperation::Alloca
                }

            rule op_binary() -> IrAstOperation
                = op:binary_op_kind() arg1:operand() comma() arg2:operand() {
                    IrAstOperation::BinaryOp(op, arg1, arg2)
                }

            rule op_branch() -> IrAstOperation
                = kw("br") to_block:id() {
                    IrAstOperation::Br(to_block)
                }

            rule op_call() -> IrAstOperation
                = kw("call") callee:id() "(" _ args:(operand() ** comma()) ")" _ {
                    IrAstOperation::Call(callee, args)
                }

            rule op_cast() -> IrAstOperation
                = kw("cast") val:operand() {
                    IrAstOperation::Cast(val)
                }

            rule op_cbr() -> IrAstOperation
                = kw("cbr") cond:operand() comma() tblock:id() comma() fblock:id() {
                    IrAstOperation::Cbr(cond, tblock, fblock)
                }

            rule op_cmp() -> IrAstOperation
                = kw("cmp") p:cmp_pred() l:operand() comma() r:operand() {
                    IrAstOperation::Cmp(p, l, r)
                }

            rule op_get_elem_ptr() -> IrAstOperation
                = kw("get_elem_ptr") base:operand() indices:gep_index()* {
                    IrAstOperation::GetElemPtr(base, indices)
                }

            rule gep_index() -> IrAstOperand
                = comma() !kw("line") idx:operand() {
                    idx
                }

            rule op_load() -> IrAstOperation
                = kw("load") src:operand() {
                    IrAstOperation::Load(src)
                }

            rule op_mem_copy() -> IrAstOperation
                = kw("mem_copy") dst:operand() comma() src:operand() {
                    IrAstOperation::MemCopy(dst, src)
                }

            rule op_nop() -> IrAstOperation
                = kw("nop") {
                    IrAstOperation::Nop
                }

            rule op_phi() -> IrAstOperation
                = kw("phi") "(" _ incoming:(phi_incoming() ** comma()) ")" _ {
                    IrAstOperation::Phi(incoming)
                }

            rule phi_incoming() -> (String, IrAstOperand)
                = label:id() ":" _ val:operand() {
                    (label, val)
                }

            // The optional return value must not swallow the label of the following block or
            // the name assigned by a (misplaced) following instruction.
            rule op_ret() -> IrAstOperation
                = kw("ret") val:(!(id() (":" / "=")) v:operand() { v })? {
                    IrAstOperation::Ret(val)
                }

            rule op_store() -> IrAstOperation
                = kw("store") val:operand() kw("to") dst:operand() {
                    IrAstOperation::Store(val, dst)
                }

            rule binary_op_kind() -> BinaryOpKind
                = kw("add") { BinaryOpKind::Add }
                / kw("sub") { BinaryOpKind::Sub }
                / kw("mul") { BinaryOpKind::Mul }
                / kw("div") { BinaryOpKind::Div }
                / kw("and") { BinaryOpKind::And }
                / kw("or") { BinaryOpKind::Or }

            rule cmp_pred() -> Predicate
                = kw("eq") { Predicate::Equal }
                / kw("ne") { Predicate::NotEqual }
                / kw("lt") { Predicate::LessThan }
                / kw("gt") { Predicate::GreaterThan }

            rule operand() -> IrAstOperand
                = c:constant() { IrAstOperand::Const(c) }
                / name:id() { IrAstOperand::Name(name) }

            rule constant() -> Constant
                = kw("true") { Constant::Bool(true) }
                / kw("false") { Constant::Bool(false) }
                / kw("null") { Constant::Null }
                / kw("undef") { Constant::Undef }
                / n:integer() { Constant::Int(n) }

            rule integer() -> i64
                = n:$("-"? ['0'..='9']+) _ {?
                    n.parse::<i64>().or(Err("integer"))
                }

            rule decimal() -> u64
                = d:$(['0'..='9']+) _ {?
                    d.parse::<u64>().or(Err("decimal"))
                }

            rule id() -> String
                = id:$(id_char0() id_char()*) _ {
                    id.to_owned()
                }

            rule kw(k: &'static str)
                = ##parse_string_literal(k) !id_char() _

            rule id_char0()
                = quiet!{ ['A'..='Z' | 'a'..='z' | '_'] }

            rule id_char()
                = quiet!{ id_char0() / ['0'..='9' | '.'] }

            rule comma()
                = quiet!{ "," _ }

            rule _()
                = quiet!{ (space() / nl() / comment())* }

            rule space()
                = [' ' | '\t']

            rule nl()
                = ['\n' | '\r']

            rule comment()
                = "//" (!nl() [_])* (nl() / ![_])

            rule eoi()
                = ![_] / expected!("end of input")
        }
    }

    // - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -

    use std::collections::HashMap;

    use crate::{
        block::Block,
        context::Context,
        error::IrError,
        function::Function,
        instruction::{BinaryOpKind, Predicate},
        module::Module,
        value::{Constant, Value},
    };

    #[derive(Debug)]
    pub(super) struct IrAstModule {
        name: String,
        fn_decls: Vec<IrAstFnDecl>,
    }

    #[derive(Debug)]
    struct IrAstFnDecl {
        name: String,
        args: Vec<String>,
        is_declaration: bool,
        is_variadic: bool,
        blocks: Vec<IrAstBlock>,
    }

    #[derive(Debug)]
    struct IrAstBlock {
        label: String,
        instructions: Vec<IrAstInstruction>,
    }

    #[derive(Debug)]
    struct IrAstInstruction {
        value_name: Option<String>,
        op: IrAstOperation,
        line: Option<u32>,
    }

    #[derive(Debug)]
    enum IrAstOperation {
        Alloca,
        BinaryOp(BinaryOpKind, IrAstOperand, IrAstOperand),
        Br(String),
        Call(String, Vec<IrAstOperand>),
        Cast(IrAstOperand),
        Cbr(IrAstOperand, String, String),
        Cmp(Predicate, IrAstOperand, IrAstOperand),
        GetElemPtr(IrAstOperand, Vec<IrAstOperand>),
        Load(IrAstOperand),
        MemCopy(IrAstOperand, IrAstOperand),
        Nop,
        Phi(Vec<(String, IrAstOperand)>),
        Ret(Option<IrAstOperand>),
        Store(IrAstOperand, IrAstOperand),
    }

    #[derive(Debug)]
    enum IrAstOperand {
        Const(Constant),
        Name(String),
    }

    pub(super) fn build_context(ir_ast_mod: IrAstModule) -> Result<Context, IrError> {
        let mut ctx = Context::default();
        let module = Module::new(&mut ctx, &ir_ast_mod.name);

        // Every function is created up front so calls and function references may refer to
        // functions defined further down.
        let mut functions = Vec::with_capacity(ir_ast_mod.fn_decls.len());
        for fn_decl in ir_ast_mod.fn_decls {
            if module.get_function(&ctx, &fn_decl.name).is_some() {
                return Err(IrError::DuplicateFunction(fn_decl.name));
            }
            // Blocks are created from the text, including the entry block, so every function
            // starts out body-less.
            let func = Function::new(
                &mut ctx,
                module,
                fn_decl.name.clone(),
                fn_decl.args.clone(),
                true,
                fn_decl.is_variadic,
            );
            functions.push((func, fn_decl));
        }

        let mut builder = IrBuilder { module };
        for (func, fn_decl) in functions {
            if !fn_decl.is_declaration {
                builder.add_fn_body(&mut ctx, func, fn_decl)?;
            }
        }

        Ok(ctx)
    }

    struct IrBuilder {
        module: Module,
    }

    struct PendingPhi {
        phi_val: Value,
        incoming: Vec<(String, IrAstOperand)>,
    }

    impl IrBuilder {
        fn add_fn_body(
            &mut self,
            context: &mut Context,
            func: Function,
            fn_decl: IrAstFnDecl,
        ) -> Result<(), IrError> {
            let mut named_blocks = HashMap::new();
            for block in &fn_decl.blocks {
                if named_blocks.contains_key(&block.label) {
                    return Err(IrError::DuplicateValue(
                        fn_decl.name.clone(),
                        block.label.clone(),
                    ));
                }
                let irblock = func.create_block(context, Some(block.label.clone()));
                named_blocks.insert(block.label.clone(), irblock);
            }

            let mut val_map: HashMap<String, Value> = func
                .args_iter(context)
                .map(|(name, val)| (name.clone(), *val))
                .collect();

            let mut pending_phis = Vec::new();
            for block in fn_decl.blocks {
                let irblock = named_blocks[&block.label];
                self.add_block_instructions(
                    context,
                    &fn_decl.name,
                    block,
                    irblock,
                    &named_blocks,
                    &mut val_map,
                    &mut pending_phis,
                )?;
            }

            // Phi incoming values may refer to values defined later in the function, e.g., around
            // a loop back edge, so they're only resolved once every block is built.
            for PendingPhi { phi_val, incoming } in pending_phis {
                for (label, operand) in incoming {
                    let block = Self::lookup_block(&named_blocks, &label)?;
                    let value =
                        self.resolve_operand(context, &fn_decl.name, &val_map, operand)?;
                    phi_val.add_phi_incoming(context, block, value);
                }
            }

            Ok(())
        }

        #[allow(clippy::too_many_arguments)]
        fn add_block_instructions(
            &mut self,
            context: &mut Context,
            fn_name: &str,
            ir_block: IrAstBlock,
            block: Block,
            named_blocks: &HashMap<String, Block>,
            val_map: &mut HashMap<String, Value>,
            pending_phis: &mut Vec<PendingPhi>,
        ) -> Result<(), IrError> {
            for ins in ir_block.instructions {
                let ins_val = match ins.op {
                    IrAstOperation::Alloca => block.append(context).alloca(),
                    IrAstOperation::BinaryOp(op, arg1, arg2) => {
                        let arg1 = self.resolve_operand(context, fn_name, val_map, arg1)?;
                        let arg2 = self.resolve_operand(context, fn_name, val_map, arg2)?;
                        block.append(context).binary_op(op, arg1, arg2)
                    }
                    IrAstOperation::Br(to_block_name) => {
                        let to_block = Self::lookup_block(named_blocks, &to_block_name)?;
                        block.append(context).branch(to_block)
                    }
                    IrAstOperation::Call(callee, args) => {
                        let args = args
                            .into_iter()
                            .map(|arg| self.resolve_operand(context, fn_name, val_map, arg))
                            .collect::<Result<Vec<_>, _>>()?;
                        match val_map.get(&callee) {
                            Some(fn_ptr) => block.append(context).call_indirect(*fn_ptr, &args),
                            None => {
                                let function = self
                                    .module
                                    .get_function(context, &callee)
                                    .ok_or_else(|| {
                                        IrError::UndefinedValue(fn_name.to_owned(), callee.clone())
                                    })?;
                                block.append(context).call(function, &args)
                            }
                        }
                    }
                    IrAstOperation::Cast(val) => {
                        let val = self.resolve_operand(context, fn_name, val_map, val)?;
                        block.append(context).cast(val)
                    }
                    IrAstOperation::Cbr(cond, tblock, fblock) => {
                        let cond = self.resolve_operand(context, fn_name, val_map, cond)?;
                        let tblock = Self::lookup_block(named_blocks, &tblock)?;
                        let fblock = Self::lookup_block(named_blocks, &fblock)?;
                        block.append(context).conditional_branch(cond, tblock, fblock)
                    }
                    IrAstOperation::Cmp(pred, lhs, rhs) => {
                        let lhs = self.resolve_operand(context, fn_name, val_map, lhs)?;
                        let rhs = self.resolve_operand(context, fn_name, val_map, rhs)?;
                        block.append(context).cmp(pred, lhs, rhs)
                    }
                    IrAstOperation::GetElemPtr(base, indices) => {
                        let base = self.resolve_operand(context, fn_name, val_map, base)?;
                        let indices = indices
                            .into_iter()
                            .map(|idx| self.resolve_operand(context, fn_name, val_map, idx))
                            .collect::<Result<Vec<_>, _>>()?;
                        block.append(context).get_elem_ptr(base, indices)
                    }
                    IrAstOperation::Load(src) => {
                        let src = self.resolve_operand(context, fn_name, val_map, src)?;
                        block.append(context).load(src)
                    }
                    IrAstOperation::MemCopy(dst, src) => {
                        let dst = self.resolve_operand(context, fn_name, val_map, dst)?;
                        let src = self.resolve_operand(context, fn_name, val_map, src)?;
                        block.append(context).mem_copy(dst, src)
                    }
                    IrAstOperation::Nop => block.append(context).nop(),
                    IrAstOperation::Phi(incoming) => {
                        let phi_val = block.append(context).phi(Vec::new());
                        pending_phis.push(PendingPhi { phi_val, incoming });
                        phi_val
                    }
                    IrAstOperation::Ret(val) => {
                        let val = val
                            .map(|val| self.resolve_operand(context, fn_name, val_map, val))
                            .transpose()?;
                        block.append(context).ret(val)
                    }
                    IrAstOperation::Store(val, dst) => {
                        let val = self.resolve_operand(context, fn_name, val_map, val)?;
                        let dst = self.resolve_operand(context, fn_name, val_map, dst)?;
                        block.append(context).store(dst, val)
                    }
                };
                let ins_val = ins_val.add_line(context, ins.line);
                if let Some(name) = ins.value_name {
                    if val_map.contains_key(&name) {
                        return Err(IrError::DuplicateValue(fn_name.to_owned(), name));
                    }
                    ins_val.set_name(context, Some(name.clone()));
                    val_map.insert(name, ins_val);
                }
            }
            Ok(())
        }

        /// Local values shadow functions of the same name.
        fn resolve_operand(
            &self,
            context: &mut Context,
            fn_name: &str,
            val_map: &HashMap<String, Value>,
            operand: IrAstOperand,
        ) -> Result<Value, IrError> {
            match operand {
                IrAstOperand::Const(c) => Ok(Value::new_constant(context, c)),
                IrAstOperand::Name(name) => val_map
                    .get(&name)
                    .copied()
                    .or_else(|| {
                        self.module
                            .get_function(context, &name)
                            .map(|func| func.get_value(context))
                    })
                    .ok_or_else(|| IrError::UndefinedValue(fn_name.to_owned(), name)),
            }
        }

        fn lookup_block(named_blocks: &HashMap<String, Block>, label: &str) -> Result<Block, IrError> {
            named_blocks
                .get(label)
                .copied()
                .ok_or_else(|| IrError::MissingBlock(label.to_owned()))
        }
    }
}

// -------------------------------------------------------------------------------------------------
