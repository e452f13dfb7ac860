//! Code-generation backend: validates AST units against the session's
//! function table and lowers them to a printable instruction form.

use std::collections::HashMap;
use std::fmt;
use std::mem;

use crate::ast::{Expression, Function, Prototype};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum CodegenError {
    #[error("unknown variable referenced {0}")]
    UnknownVariable(String),
    #[error("unknown operator {0}")]
    UnknownOperator(char),
    #[error("unknown function {0}")]
    UnknownFunction(String),
    #[error("invalid number of args for {0} expected {1} found {2}")]
    InvalidCall(String, usize, usize),
    #[error("function {0} cannot be redefined")]
    Redefinition(String),
}

/// The narrow interface the driver emits completed units through.
pub trait Backend {
    fn emit_function(&mut self, function: &Function) -> Result<CompiledUnit, CodegenError>;
    fn emit_declaration(&mut self, prototype: &Prototype) -> Result<CompiledUnit, CodegenError>;
}

/// One lowered top-level unit. `code` is empty for a bare declaration.
#[derive(Debug, PartialEq, Clone)]
pub struct CompiledUnit {
    pub prototype: Prototype,
    pub code: Vec<String>,
}

impl fmt::Display for CompiledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code.is_empty() {
            write!(f, "extern {}", self.prototype)
        } else {
            writeln!(f, "func {}:", self.prototype)?;
            write!(f, "  {}", self.code.join("\n  "))
        }
    }
}

/// What the session knows about a function name: its arity and whether a
/// body has been emitted for it yet.
#[derive(Debug, PartialEq, Clone)]
pub struct Signature {
    pub arity: usize,
    pub defined: bool,
}

/// The units emitted so far, plus the signature table they are checked
/// against. Lives for the whole session.
#[derive(Debug)]
pub struct Module {
    name: String,
    units: Vec<CompiledUnit>,
    signatures: HashMap<String, Signature>,
}

impl Module {
    fn new(name: &str) -> Module {
        Module {
            name: name.to_string(),
            units: Vec::new(),
            signatures: HashMap::new(),
        }
    }

    pub fn units(&self) -> &[CompiledUnit] {
        &self.units
    }

    pub fn get_function(&self, name: &str) -> Option<&Signature> {
        self.signatures.get(name)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for unit in &self.units {
            writeln!(f)?;
            writeln!(f, "{}", unit)?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Clone)]
enum Operand {
    Num(f64),
    Var(String),
    Tmp(u32),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Num(value) => write!(f, "{}", value),
            Operand::Var(name) => write!(f, "{}", name),
            Operand::Tmp(n) => write!(f, "t{}", n),
        }
    }
}

pub struct Codegen {
    pub module: Module,
    named_values: HashMap<String, Operand>,
    code: Vec<String>,
    next_tmp: u32,
}

impl Codegen {
    pub fn new(module_name: &str) -> Codegen {
        Codegen {
            module: Module::new(module_name),
            named_values: HashMap::new(),
            code: Vec::new(),
            next_tmp: 0,
        }
    }

    fn push_instr(&mut self, rhs: String) -> Operand {
        let tmp = Operand::Tmp(self.next_tmp);
        self.next_tmp += 1;
        self.code.push(format!("{} = {}", tmp, rhs));
        tmp
    }

    fn codegen_expr(&mut self, expr: &Expression) -> Result<Operand, CodegenError> {
        match expr {
            Expression::Literal(value) => Ok(Operand::Num(*value)),
            Expression::Variable(name) => match self.named_values.get(name) {
                Some(operand) => Ok(operand.clone()),
                None => Err(CodegenError::UnknownVariable(name.clone())),
            },
            Expression::Binary(op, lhs, rhs) => {
                let lhs = self.codegen_expr(lhs)?;
                let rhs = self.codegen_expr(rhs)?;

                let mnemonic = match op {
                    '+' => "add",
                    '-' => "sub",
                    '*' => "mul",
                    // comparison yields 0 or 1 like every other value
                    '<' => "lt",
                    _ => return Err(CodegenError::UnknownOperator(*op)),
                };
                Ok(self.push_instr(format!("{} {}, {}", mnemonic, lhs, rhs)))
            }
            Expression::Call(callee, args) => {
                let arity = match self.module.get_function(callee) {
                    Some(signature) => signature.arity,
                    None => return Err(CodegenError::UnknownFunction(callee.clone())),
                };
                if arity != args.len() {
                    return Err(CodegenError::InvalidCall(callee.clone(), arity, args.len()));
                }

                let mut operands = Vec::with_capacity(args.len());
                for arg in args {
                    operands.push(self.codegen_expr(arg)?.to_string());
                }
                Ok(self.push_instr(format!("call {}({})", callee, operands.join(", "))))
            }
        }
    }
}

impl Backend for Codegen {
    fn emit_function(&mut self, function: &Function) -> Result<CompiledUnit, CodegenError> {
        let proto = &function.prototype;

        // Anonymous wrappers are emitted but never enter the signature
        // table, so repeated bare expressions cannot collide.
        let prior = if proto.is_anonymous() {
            None
        } else {
            if let Some(signature) = self.module.get_function(&proto.name) {
                if signature.defined {
                    return Err(CodegenError::Redefinition(proto.name.clone()));
                }
                if signature.arity != proto.params.len() {
                    return Err(CodegenError::InvalidCall(
                        proto.name.clone(),
                        signature.arity,
                        proto.params.len(),
                    ));
                }
            }
            // Register before lowering the body so recursive calls resolve.
            self.module.signatures.insert(
                proto.name.clone(),
                Signature {
                    arity: proto.params.len(),
                    defined: true,
                },
            )
        };

        self.named_values.clear();
        for param in &proto.params {
            self.named_values
                .insert(param.clone(), Operand::Var(param.clone()));
        }
        self.code.clear();
        self.next_tmp = 0;

        let ret = match self.codegen_expr(&function.body) {
            Ok(ret) => ret,
            Err(e) => {
                // A failed emission must leave the table as it was.
                if !proto.is_anonymous() {
                    match prior {
                        Some(signature) => {
                            self.module.signatures.insert(proto.name.clone(), signature);
                        }
                        None => {
                            self.module.signatures.remove(&proto.name);
                        }
                    }
                }
                return Err(e);
            }
        };
        self.code.push(format!("ret {}", ret));

        let unit = CompiledUnit {
            prototype: proto.clone(),
            code: mem::take(&mut self.code),
        };
        self.module.units.push(unit.clone());
        Ok(unit)
    }

    fn emit_declaration(&mut self, prototype: &Prototype) -> Result<CompiledUnit, CodegenError> {
        let unit = CompiledUnit {
            prototype: prototype.clone(),
            code: Vec::new(),
        };

        if let Some(signature) = self.module.get_function(&prototype.name) {
            // Re-declaring a known name is a no-op as long as the arity
            // matches.
            if signature.arity != prototype.params.len() {
                return Err(CodegenError::InvalidCall(
                    prototype.name.clone(),
                    signature.arity,
                    prototype.params.len(),
                ));
            }
            return Ok(unit);
        }

        self.module.signatures.insert(
            prototype.name.clone(),
            Signature {
                arity: prototype.params.len(),
                defined: false,
            },
        );
        self.module.units.push(unit.clone());
        Ok(unit)
    }
}
