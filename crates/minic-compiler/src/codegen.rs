use tracing::{debug, info};

use crate::ast::{BinOp, CmpOp, Expr, ExprKind, Item, Program, Stmt};
use crate::emit::{DataEntry, DataInit, Emitter, Label, SizeClass, Sym};
use crate::error::{CodegenError, CodegenResult};
use crate::regalloc::{Reg, RegisterPool};
use crate::symtab::{Symbol, SymbolId, SymbolTable};

macro_rules! emit {
    ($gen:expr, $($arg:tt)*) => { $gen.out.ins(format_args!($($arg)*)) };
}

/// Callee-saved registers the pool draws from; saved in every prologue.
const SAVED: [&str; 4] = ["r12", "r13", "r14", "r15"];

/// Lowers a checked program to NASM x86-64 assembly.
pub fn generate(program: &Program) -> CodegenResult<String> {
    let mut gen = Codegen::new(&program.symbols);
    for item in &program.items {
        match item {
            Item::Global { var, init, .. } => gen.global(*var, init.as_ref())?,
            Item::Function { func, body, .. } => gen.function(*func, body)?,
        }
    }
    gen.out.finish()
}

fn mem(bytes: u32) -> &'static str { SizeClass::from_bytes(bytes).keyword() }

fn arg_reg(bytes: u32) -> &'static str {
    match bytes {
        1 => "dil",
        4 => "edi",
        _ => "rdi",
    }
}

fn set_cc(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "sete",
        CmpOp::Ne => "setne",
        CmpOp::Lt => "setl",
        CmpOp::Le => "setle",
        CmpOp::Gt => "setg",
        CmpOp::Ge => "setge",
    }
}

struct Codegen<'a> {
    symbols: &'a SymbolTable,
    regs: RegisterPool,
    out: Emitter,
    /// End labels of the enclosing loops, innermost last.
    loops: Vec<Label>,
}

impl<'a> Codegen<'a> {
    fn new(symbols: &'a SymbolTable) -> Self {
        Self { symbols, regs: RegisterPool::new(), out: Emitter::new(), loops: Vec::new() }
    }

    fn sym(&self, id: SymbolId) -> &'a Symbol { self.symbols.get(id) }

    fn reserve(&mut self, var: SymbolId, init: Option<DataInit>) -> CodegenResult<()> {
        let sym = self.sym(var);
        let (class, count) = if sym.ty.is_array() {
            (SizeClass::from_bytes(sym.ty.elem_size()), sym.ty.array_len)
        } else {
            (SizeClass::from_bytes(sym.ty.value_bytes()), 1)
        };
        self.out.reserve(DataEntry { name: sym.name.clone(), class, count, init })
    }

    fn static_init(&mut self, var: SymbolId, init: &Expr) -> CodegenResult<DataInit> {
        let sym = self.sym(var);
        match &init.kind {
            ExprKind::IntLit(v) => Ok(DataInit::Int(*v)),
            ExprKind::StrLit(s) if sym.ty.is_array() => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                Ok(DataInit::Bytes(bytes))
            }
            ExprKind::StrLit(s) => Ok(DataInit::Address(self.out.string_literal(s)?)),
            _ => Err(CodegenError::NonStaticInitializer { name: sym.name.clone() }),
        }
    }

    fn global(&mut self, var: SymbolId, init: Option<&Expr>) -> CodegenResult<()> {
        let init = init.map(|e| self.static_init(var, e)).transpose()?;
        self.reserve(var, init)
    }

    fn function(&mut self, func: SymbolId, body: &[Stmt]) -> CodegenResult<()> {
        let sym = self.sym(func);
        info!(function = %sym.name, statements = body.len(), "lowering function");
        self.out.function_label(&sym.name)?;
        emit!(self, "push rbp")?;
        emit!(self, "mov rbp, rsp")?;
        for reg in SAVED {
            emit!(self, "push {reg}")?;
        }
        if let Some(storage) = sym.params().first().and_then(|p| p.storage) {
            self.reserve(storage, None)?;
            let param = self.sym(storage);
            let bytes = param.ty.value_bytes();
            emit!(self, "mov {} [rel {}], {}", mem(bytes), Sym(&param.name), arg_reg(bytes))?;
        }
        self.block(body)?;
        if !matches!(body.last(), Some(Stmt::Return { .. })) {
            emit!(self, "xor eax, eax")?;
            self.epilogue()?;
        }
        Ok(())
    }

    fn epilogue(&mut self) -> CodegenResult<()> {
        for reg in SAVED.iter().rev() {
            emit!(self, "pop {reg}")?;
        }
        emit!(self, "pop rbp")?;
        emit!(self, "ret")
    }

    fn block(&mut self, stmts: &[Stmt]) -> CodegenResult<()> {
        for stmt in stmts {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    /// Lowers one statement and checks every register it took was given back.
    fn stmt(&mut self, stmt: &Stmt) -> CodegenResult<()> {
        self.lower_stmt(stmt)?;
        match self.regs.in_use() {
            0 => Ok(()),
            count => Err(CodegenError::RegisterLeak { count }),
        }
    }

    fn loop_body(&mut self, body: &[Stmt], end: Label) -> CodegenResult<()> {
        self.loops.push(end);
        let res = self.block(body);
        self.loops.pop();
        res
    }

    /// Conditions hold only when they evaluate to exactly 1.
    fn branch_if_false(&mut self, cond: &Expr, target: Label) -> CodegenResult<()> {
        let r = self.expr(cond)?;
        emit!(self, "cmp {r}, 1")?;
        emit!(self, "jne {target}")?;
        self.regs.free(r)
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> CodegenResult<()> {
        match stmt {
            Stmt::VarDecl { var, init, .. } => {
                let sym = self.sym(*var);
                match init {
                    // literals become initial data, like a global's
                    Some(e) if sym.ty.is_array() || e.is_literal() => {
                        let init = self.static_init(*var, e)?;
                        self.reserve(*var, Some(init))
                    }
                    Some(e) => {
                        self.reserve(*var, None)?;
                        let r = self.expr(e)?;
                        self.store(&format!("[rel {}]", Sym(&sym.name)), r, sym.ty.value_bytes())?;
                        self.regs.free(r)
                    }
                    None => self.reserve(*var, None),
                }
            }
            Stmt::Assign { target, value, .. } => {
                let r = self.expr(value)?;
                self.assign(target, r)?;
                self.regs.free(r)
            }
            Stmt::Call(call) => match &call.kind {
                ExprKind::Call { func, arg } => match self.call(*func, arg.as_deref())? {
                    Some(r) => self.regs.free(r),
                    None => Ok(()),
                },
                _ => Err(CodegenError::InvalidNode { kind: call.kind_name() }),
            },
            Stmt::If { cond, then_body, else_body, .. } => {
                let else_label = self.out.new_label();
                self.branch_if_false(cond, else_label)?;
                self.block(then_body)?;
                match else_body {
                    Some(else_body) => {
                        let end = self.out.new_label();
                        emit!(self, "jmp {end}")?;
                        self.out.place_label(else_label)?;
                        self.block(else_body)?;
                        self.out.place_label(end)
                    }
                    None => self.out.place_label(else_label),
                }
            }
            Stmt::While { cond, body, .. } => {
                let start = self.out.new_label();
                let end = self.out.new_label();
                self.out.place_label(start)?;
                self.branch_if_false(cond, end)?;
                self.loop_body(body, end)?;
                emit!(self, "jmp {start}")?;
                self.out.place_label(end)
            }
            Stmt::DoWhile { body, cond, .. } => {
                let start = self.out.new_label();
                let end = self.out.new_label();
                self.out.place_label(start)?;
                self.loop_body(body, end)?;
                let r = self.expr(cond)?;
                emit!(self, "cmp {r}, 1")?;
                emit!(self, "je {start}")?;
                self.regs.free(r)?;
                self.out.place_label(end)
            }
            Stmt::For { init, cond, update, body, .. } => {
                self.block(init)?;
                let start = self.out.new_label();
                let end = self.out.new_label();
                self.out.place_label(start)?;
                self.branch_if_false(cond, end)?;
                self.loop_body(body, end)?;
                if let Some(update) = update {
                    self.stmt(update)?;
                }
                emit!(self, "jmp {start}")?;
                self.out.place_label(end)
            }
            Stmt::Break(_) => {
                let target = *self.loops.last().ok_or(CodegenError::BreakOutsideLoop)?;
                emit!(self, "jmp {target}")
            }
            Stmt::Return { value, func, .. } => {
                if let Some(value) = value {
                    let r = self.expr(value)?;
                    match self.sym(*func).ty.value_bytes() {
                        1 => emit!(self, "movsx rax, {}", r.byte())?,
                        4 => emit!(self, "movsxd rax, {}", r.sized(4))?,
                        _ => emit!(self, "mov rax, {r}")?,
                    }
                    self.regs.free(r)?;
                }
                self.epilogue()
            }
            Stmt::Empty(_) => Ok(()),
        }
    }

    fn load(&mut self, dst: Reg, addr: &str, bytes: u32) -> CodegenResult<()> {
        match bytes {
            1 => emit!(self, "movsx {dst}, byte {addr}"),
            4 => emit!(self, "movsxd {dst}, dword {addr}"),
            _ => emit!(self, "mov {dst}, qword {addr}"),
        }
    }

    fn store(&mut self, addr: &str, src: Reg, bytes: u32) -> CodegenResult<()> {
        emit!(self, "mov {} {addr}, {}", mem(bytes), src.sized(bytes))
    }

    fn assign(&mut self, target: &Expr, value: Reg) -> CodegenResult<()> {
        let bytes = target.ty.value_bytes();
        match &target.kind {
            ExprKind::Var(id) => {
                let name = Sym(&self.sym(*id).name);
                self.store(&format!("[rel {name}]"), value, bytes)
            }
            ExprKind::Deref { expr, levels } => {
                let addr = self.expr(expr)?;
                for _ in 1..*levels {
                    emit!(self, "mov {addr}, qword [{addr}]")?;
                }
                self.store(&format!("[{addr}]"), value, bytes)?;
                self.regs.free(addr)
            }
            ExprKind::Index { base, offset } => {
                let addr = self.index_address(base, offset)?;
                self.store(&format!("[{addr}]"), value, bytes)?;
                self.regs.free(addr)
            }
            _ => Err(CodegenError::UnsupportedLvalue { kind: target.kind_name() }),
        }
    }

    fn address(&mut self, e: &Expr) -> CodegenResult<Reg> {
        match &e.kind {
            ExprKind::Var(id) => {
                let name = Sym(&self.sym(*id).name);
                let r = self.regs.allocate()?;
                emit!(self, "lea {r}, [rel {name}]")?;
                Ok(r)
            }
            ExprKind::Index { base, offset } => self.index_address(base, offset),
            _ => Err(CodegenError::UnsupportedLvalue { kind: e.kind_name() }),
        }
    }

    fn index_address(&mut self, base: &Expr, offset: &Expr) -> CodegenResult<Reg> {
        let a = self.expr(base)?;
        let b = self.expr(offset)?;
        emit!(self, "add {a}, {b}")?;
        self.regs.free(b)?;
        Ok(a)
    }

    fn call(&mut self, func: SymbolId, arg: Option<&Expr>) -> CodegenResult<Option<Reg>> {
        let sym = self.sym(func);
        if let Some(arg) = arg {
            let r = self.expr(arg)?;
            emit!(self, "mov rdi, {r}")?;
            self.regs.free(r)?;
        }
        if sym.is_builtin() {
            self.out.use_extern(&sym.name);
            emit!(self, "call {} wrt ..plt", sym.name)?;
        } else {
            emit!(self, "call {}", Sym(&sym.name))?;
        }
        if sym.ty.is_void() {
            return Ok(None);
        }
        let r = self.regs.allocate()?;
        emit!(self, "mov {r}, rax")?;
        Ok(Some(r))
    }

    /// Lowers an expression; the returned register belongs to the caller.
    fn expr(&mut self, e: &Expr) -> CodegenResult<Reg> {
        match &e.kind {
            ExprKind::IntLit(v) => {
                let r = self.regs.allocate()?;
                emit!(self, "mov {r}, {v}")?;
                Ok(r)
            }
            ExprKind::StrLit(s) => {
                let label = self.out.string_literal(s)?;
                let r = self.regs.allocate()?;
                emit!(self, "lea {r}, [rel {}]", Sym(&label))?;
                Ok(r)
            }
            ExprKind::Var(id) => {
                let name = Sym(&self.sym(*id).name);
                let r = self.regs.allocate()?;
                self.load(r, &format!("[rel {name}]"), e.ty.value_bytes())?;
                Ok(r)
            }
            ExprKind::AddressOf(inner) => self.address(inner),
            ExprKind::Binary { op, left, right } => {
                let a = self.expr(left)?;
                let b = self.expr(right)?;
                match op {
                    BinOp::Add => emit!(self, "add {a}, {b}")?,
                    BinOp::Sub => emit!(self, "sub {a}, {b}")?,
                    BinOp::Mul => emit!(self, "imul {a}, {b}")?,
                    BinOp::Div => {
                        emit!(self, "mov rax, {a}")?;
                        emit!(self, "cqo")?;
                        emit!(self, "idiv {b}")?;
                        emit!(self, "mov {a}, rax")?;
                    }
                }
                self.regs.free(b)?;
                Ok(a)
            }
            ExprKind::Compare { op, left, right } => {
                let a = self.expr(left)?;
                let b = self.expr(right)?;
                emit!(self, "cmp {a}, {b}")?;
                emit!(self, "{} {}", set_cc(*op), a.byte())?;
                emit!(self, "movzx {a}, {}", a.byte())?;
                self.regs.free(b)?;
                Ok(a)
            }
            ExprKind::Deref { expr, levels } => {
                let r = self.expr(expr)?;
                for level in 1..=*levels {
                    let bytes = if level == *levels { e.ty.value_bytes() } else { 8 };
                    self.load(r, &format!("[{r}]"), bytes)?;
                }
                Ok(r)
            }
            ExprKind::Index { base, offset } => {
                let r = self.index_address(base, offset)?;
                self.load(r, &format!("[{r}]"), e.ty.value_bytes())?;
                Ok(r)
            }
            ExprKind::Scale { expr, size } => {
                let r = self.expr(expr)?;
                if *size != 1 {
                    let s = self.regs.allocate()?;
                    emit!(self, "mov {s}, {size}")?;
                    emit!(self, "imul {r}, {s}")?;
                    self.regs.free(s)?;
                }
                Ok(r)
            }
            ExprKind::Call { func, arg } => {
                let func = *func;
                self.call(func, arg.as_deref())?
                    .ok_or_else(|| CodegenError::VoidValue { name: self.sym(func).name.clone() })
            }
            ExprKind::Detached => {
                debug!("detached expression node reached codegen");
                Err(CodegenError::InvalidNode { kind: e.kind_name() })
            }
        }
    }
}
