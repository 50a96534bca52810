//! AST node definitions.
//!
//! The tree mirrors the bash grammar: a script is a list of statements, a
//! statement is pipelines joined by connectives, a pipeline is commands
//! joined by `|`/`|&`, and a command is either a simple command, one of the
//! compound commands, or a function definition. Words are sequences of typed
//! parts; expansion walks the parts rather than re-scanning strings.

/// Root node: a complete script.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScriptNode {
    pub statements: Vec<StatementNode>,
}

/// Pipelines joined by `&&`, `||`, `;`, or `&`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementNode {
    pub pipelines: Vec<PipelineNode>,
    /// Connective after pipeline `i` lives at `connectives[i]`.
    pub connectives: Vec<Connective>,
    pub background: bool,
    /// Syntax error detected at parse time but raised only when executed.
    pub deferred_error: Option<DeferredError>,
    /// Original source text, for `set -v`.
    pub source_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    AndIf,  // &&
    OrIf,   // ||
    Seq,    // ;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredError {
    pub message: String,
    pub token: String,
}

/// Commands joined by `|` or `|&`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineNode {
    pub commands: Vec<CommandNode>,
    pub negated: bool,
    pub timed: bool,
    pub time_posix: bool,
    /// `pipe_stderr[i]` is true when the pipe after command `i` is `|&`.
    pub pipe_stderr: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandNode {
    Simple(SimpleCommandNode),
    Compound(CompoundCommandNode),
    FunctionDef(FunctionDefNode),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimpleCommandNode {
    pub assignments: Vec<AssignmentNode>,
    pub name: Option<WordNode>,
    pub args: Vec<WordNode>,
    pub redirections: Vec<RedirectionNode>,
    pub line: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompoundCommandNode {
    If(IfNode),
    For(ForNode),
    CStyleFor(CStyleForNode),
    While(WhileNode),
    Until(UntilNode),
    Case(CaseNode),
    Subshell(SubshellNode),
    Group(GroupNode),
    Arithmetic(ArithmeticCommandNode),
    Conditional(ConditionalCommandNode),
}

impl CompoundCommandNode {
    pub fn redirections(&self) -> &[RedirectionNode] {
        match self {
            CompoundCommandNode::If(n) => &n.redirections,
            CompoundCommandNode::For(n) => &n.redirections,
            CompoundCommandNode::CStyleFor(n) => &n.redirections,
            CompoundCommandNode::While(n) => &n.redirections,
            CompoundCommandNode::Until(n) => &n.redirections,
            CompoundCommandNode::Case(n) => &n.redirections,
            CompoundCommandNode::Subshell(n) => &n.redirections,
            CompoundCommandNode::Group(n) => &n.redirections,
            CompoundCommandNode::Arithmetic(n) => &n.redirections,
            CompoundCommandNode::Conditional(n) => &n.redirections,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    /// `if`/`elif` arms in order.
    pub arms: Vec<IfArm>,
    pub else_body: Option<Vec<StatementNode>>,
    pub redirections: Vec<RedirectionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfArm {
    pub condition: Vec<StatementNode>,
    pub body: Vec<StatementNode>,
}

/// `for VAR [in words]; do ... done`. `words: None` iterates `"$@"`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForNode {
    pub variable: String,
    pub words: Option<Vec<WordNode>>,
    pub body: Vec<StatementNode>,
    pub redirections: Vec<RedirectionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CStyleForNode {
    pub init: Option<ArithExpr>,
    pub condition: Option<ArithExpr>,
    pub update: Option<ArithExpr>,
    pub body: Vec<StatementNode>,
    pub redirections: Vec<RedirectionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileNode {
    pub condition: Vec<StatementNode>,
    pub body: Vec<StatementNode>,
    pub redirections: Vec<RedirectionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UntilNode {
    pub condition: Vec<StatementNode>,
    pub body: Vec<StatementNode>,
    pub redirections: Vec<RedirectionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseNode {
    pub word: WordNode,
    pub items: Vec<CaseItemNode>,
    pub redirections: Vec<RedirectionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseItemNode {
    pub patterns: Vec<WordNode>,
    pub body: Vec<StatementNode>,
    pub terminator: CaseTerminator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseTerminator {
    Break,       // ;;
    FallThrough, // ;&
    Continue,    // ;;&
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubshellNode {
    pub body: Vec<StatementNode>,
    pub redirections: Vec<RedirectionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupNode {
    pub body: Vec<StatementNode>,
    pub redirections: Vec<RedirectionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArithmeticCommandNode {
    pub expression: ArithExpr,
    pub redirections: Vec<RedirectionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalCommandNode {
    pub expression: CondExpr,
    pub redirections: Vec<RedirectionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefNode {
    pub name: String,
    pub body: Box<CompoundCommandNode>,
    pub redirections: Vec<RedirectionNode>,
    pub source_file: Option<String>,
}

/// `name=value`, `name+=value`, `name[i]=value`, or `name=(a b c)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentNode {
    /// Variable name, possibly carrying a `[subscript]` suffix.
    pub name: String,
    pub append: bool,
    pub value: Option<WordNode>,
    pub array: Option<Vec<WordNode>>,
}

// ---------------------------------------------------------------------------
// Redirections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RedirectionNode {
    pub fd: Option<i32>,
    /// `{name}>file` form: allocate an FD and store its number in `name`.
    pub fd_variable: Option<String>,
    pub operator: RedirOp,
    pub target: RedirTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirOp {
    In,          // <
    Out,         // >
    Append,      // >>
    Clobber,     // >|
    ReadWrite,   // <>
    DupIn,       // <&
    DupOut,      // >&
    OutErr,      // &>
    AppendErr,   // &>>
    HereString,  // <<<
    HereDoc,     // <<
    HereDocTabs, // <<-
}

impl std::fmt::Display for RedirOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RedirOp::In => "<",
            RedirOp::Out => ">",
            RedirOp::Append => ">>",
            RedirOp::Clobber => ">|",
            RedirOp::ReadWrite => "<>",
            RedirOp::DupIn => "<&",
            RedirOp::DupOut => ">&",
            RedirOp::OutErr => "&>",
            RedirOp::AppendErr => "&>>",
            RedirOp::HereString => "<<<",
            RedirOp::HereDoc => "<<",
            RedirOp::HereDocTabs => "<<-",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RedirTarget {
    Word(WordNode),
    HereDoc(HereDocBody),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HereDocBody {
    pub delimiter: String,
    /// Body parsed into parts; a quoted delimiter yields a single literal part.
    pub content: WordNode,
    pub strip_tabs: bool,
    pub quoted: bool,
}

// ---------------------------------------------------------------------------
// Words
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WordNode {
    pub parts: Vec<WordPart>,
}

impl WordNode {
    pub fn literal(text: impl Into<String>) -> Self {
        WordNode {
            parts: vec![WordPart::Literal(text.into())],
        }
    }

    /// Flatten to plain text when every part is literal-like; used for
    /// keyword-ish checks (`in`, case patterns) and assignment names.
    pub fn as_literal(&self) -> Option<String> {
        let mut s = String::new();
        for part in &self.parts {
            match part {
                WordPart::Literal(t) => s.push_str(t),
                _ => return None,
            }
        }
        Some(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WordPart {
    Literal(String),
    SingleQuoted(String),
    DoubleQuoted(Vec<WordPart>),
    /// A single escaped character (`\x`).
    Escaped(String),
    Parameter(ParameterPart),
    CommandSubst(CommandSubstPart),
    Arithmetic(ArithExpr),
    /// `~` or `~user`; only meaningful at the start of a word.
    Tilde(Option<String>),
    Brace(Vec<BraceItem>),
    /// Raw glob pattern text (contains unquoted `*`, `?`, `[...]`, extglob).
    Glob(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandSubstPart {
    pub body: ScriptNode,
    pub backquoted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BraceItem {
    Word(WordNode),
    Range {
        start: RangeEndpoint,
        end: RangeEndpoint,
        step: Option<i64>,
        /// Textual forms, retained for zero-padding detection.
        start_text: String,
        end_text: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeEndpoint {
    Int(i64),
    Char(char),
}

// ---------------------------------------------------------------------------
// Parameter expansion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterPart {
    /// Parameter name, possibly carrying a `[subscript]` suffix.
    pub parameter: String,
    pub op: Option<ParamOp>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamOp {
    /// `${x:-w}` / `${x-w}`
    Default { word: WordNode, check_empty: bool },
    /// `${x:=w}` / `${x=w}`
    AssignDefault { word: WordNode, check_empty: bool },
    /// `${x:?w}` / `${x?w}`
    ErrorIfUnset { word: Option<WordNode>, check_empty: bool },
    /// `${x:+w}` / `${x+w}`
    Alternative { word: WordNode, check_empty: bool },
    /// `${#x}`
    Length,
    /// `${#x:...}` parses but always fails at expansion time.
    LengthSlice,
    /// `${x:o}` / `${x:o:l}`
    Substring {
        offset: ArithExpr,
        length: Option<ArithExpr>,
    },
    /// `${x#p}` `${x##p}` `${x%p}` `${x%%p}`
    RemovePattern {
        pattern: WordNode,
        suffix: bool,
        greedy: bool,
    },
    /// `${x/p/r}` family.
    ReplacePattern {
        pattern: WordNode,
        replacement: Option<WordNode>,
        all: bool,
        anchor: PatternAnchor,
    },
    /// `${x^}` `${x^^}` `${x,}` `${x,,}`
    CaseMod {
        upper: bool,
        all: bool,
        pattern: Option<WordNode>,
    },
    /// `${x@Q}` and friends.
    Transform(TransformKind),
    /// `${!x}` (with optional inner operation applied to the target).
    Indirection { inner: Option<Box<ParamOp>> },
    /// `${!arr[@]}` / `${!arr[*]}`
    ArrayKeys { star: bool },
    /// `${!prefix*}` / `${!prefix@}`
    NamePrefix { star: bool },
    /// Unparseable `${...}`; raises a bad-substitution failure when expanded.
    BadSubstitution { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternAnchor {
    None,
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    Quote,      // Q
    Escape,     // E
    Prompt,     // P
    Assignment, // A
    Attributes, // a
    Keys,       // K
    Upper,      // U
    Lower,      // L
    UpperFirst, // u
}

// ---------------------------------------------------------------------------
// Arithmetic expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ArithExpr {
    Number(i64),
    /// `x` or `$x`; bare names resolve through the environment.
    Variable { name: String, dollar: bool },
    /// `a[expr]` or `a[string-key]` for associative arrays.
    Element {
        array: String,
        index: Option<Box<ArithExpr>>,
        key: Option<String>,
    },
    Binary {
        op: ArithBinOp,
        lhs: Box<ArithExpr>,
        rhs: Box<ArithExpr>,
    },
    Unary {
        op: ArithUnaryOp,
        operand: Box<ArithExpr>,
        postfix: bool,
    },
    Ternary {
        cond: Box<ArithExpr>,
        then: Box<ArithExpr>,
        other: Box<ArithExpr>,
    },
    Assign {
        op: ArithAssignOp,
        name: String,
        index: Option<Box<ArithExpr>>,
        key: Option<String>,
        value: Box<ArithExpr>,
    },
    Group(Box<ArithExpr>),
    /// `$(cmd)` inside arithmetic; the output is re-evaluated as an integer.
    CommandSubst(ScriptNode),
    /// `'c'` evaluates to the character code.
    CharLiteral(i64),
    /// Empty expression: `(( ))` and missing C-for slots evaluate to 0.
    Empty,
    /// Deferred parse failure, reported when evaluated.
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithBinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitOr,
    BitXor,
    LogAnd,
    LogOr,
    Comma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithUnaryOp {
    Neg,
    Pos,
    Not,
    BitNot,
    Inc,
    Dec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithAssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

// ---------------------------------------------------------------------------
// Conditional expressions ([[ ]])
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum CondExpr {
    And(Box<CondExpr>, Box<CondExpr>),
    Or(Box<CondExpr>, Box<CondExpr>),
    Not(Box<CondExpr>),
    Group(Box<CondExpr>),
    Unary {
        op: CondUnaryOp,
        operand: WordNode,
    },
    Binary {
        op: CondBinOp,
        lhs: WordNode,
        rhs: WordNode,
    },
    /// A bare word: true when it expands to a non-empty string.
    Word(WordNode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondUnaryOp {
    BlockSpecial,    // -b
    CharSpecial,     // -c
    Directory,       // -d
    Exists,          // -e
    RegularFile,     // -f
    SetGid,          // -g
    Symlink,         // -h, -L
    Sticky,          // -k
    Fifo,            // -p
    Readable,        // -r
    NonEmptyFile,    // -s
    Terminal,        // -t
    SetUid,          // -u
    Writable,        // -w
    Executable,      // -x
    OwnedByEuid,     // -O
    OwnedByEgid,     // -G
    Socket,          // -S
    ModifiedSince,   // -N
    ZeroLength,      // -z
    NonZeroLength,   // -n
    VarSet,          // -v
    OptionSet,       // -o
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondBinOp {
    StrEq,       // = / ==  (pattern match in [[ ]])
    StrNe,       // !=      (negated pattern match)
    Regex,       // =~
    StrLt,       // <
    StrGt,       // >
    NumEq,       // -eq
    NumNe,       // -ne
    NumLt,       // -lt
    NumLe,       // -le
    NumGt,       // -gt
    NumGe,       // -ge
    NewerThan,   // -nt
    OlderThan,   // -ot
    SameFile,    // -ef
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_as_literal() {
        let word = WordNode {
            parts: vec![
                WordPart::Literal("ab".into()),
                WordPart::Literal("cd".into()),
            ],
        };
        assert_eq!(word.as_literal().as_deref(), Some("abcd"));

        let word = WordNode {
            parts: vec![WordPart::SingleQuoted("x".into())],
        };
        assert_eq!(word.as_literal(), None);
    }

    #[test]
    fn compound_redirections_accessor() {
        let group = CompoundCommandNode::Group(GroupNode {
            body: vec![],
            redirections: vec![RedirectionNode {
                fd: Some(2),
                fd_variable: None,
                operator: RedirOp::Out,
                target: RedirTarget::Word(WordNode::literal("log")),
            }],
        });
        assert_eq!(group.redirections().len(), 1);
    }
}
