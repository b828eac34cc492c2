//! Go text/template to MiniJinja translation
//!
//! Manifests are Go templates: `{{ }}` is the only delimiter and actions use
//! Go syntax (`.Field`, `$var`, pipes, `if`/`else`/`range`/`with`/`end`).
//! [`translate`] turns such a template into MiniJinja source before parsing.
//!
//! Literal text is copied as is, except that `{%` and `{#` are emitted through
//! expression blocks so MiniJinja never reads them as tags. Newlines inside an
//! action are kept inside the generated tag, so line numbers in the
//! translated source match the original template.

use std::fmt;

/// A template that is not valid Go template syntax
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoSyntaxError {
    pub message: String,
    /// Byte offset of the offending action in the original template
    pub offset: usize,
}

impl fmt::Display for GoSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GoSyntaxError {}

type Result<T> = std::result::Result<T, String>;

/// Translate a Go template into equivalent MiniJinja source
pub fn translate(source: &str) -> std::result::Result<String, GoSyntaxError> {
    let mut translator = Translator::default();

    for element in split(source)? {
        match element {
            Element::Text(text) => translator.text(text),
            Element::Action(action) => translator
                .action(&action)
                .map_err(|message| GoSyntaxError {
                    message,
                    offset: action.offset,
                })?,
        }
    }

    if let Some(frame) = translator.frames.last() {
        return Err(GoSyntaxError {
            message: format!("unexpected EOF: missing {{{{end}}}} for {}", frame.block),
            offset: frame.offset,
        });
    }

    Ok(translator.out)
}

enum Element<'a> {
    Text(&'a str),
    Action(Action<'a>),
}

struct Action<'a> {
    trim_left: bool,
    trim_right: bool,
    body: &'a str,
    offset: usize,
    newlines: usize,
}

/// Split a template into literal text and `{{ }}` actions
fn split(source: &str) -> std::result::Result<Vec<Element<'_>>, GoSyntaxError> {
    let mut elements = Vec::new();
    let mut pos = 0;

    while let Some(found) = source[pos..].find("{{") {
        let start = pos + found;
        if start > pos {
            elements.push(Element::Text(&source[pos..start]));
        }

        let mut body_start = start + 2;
        let trim_left = is_trim_marker(&source[body_start..]);
        if trim_left {
            body_start += 1;
        }

        let Some(close) = find_action_end(&source[body_start..]) else {
            return Err(GoSyntaxError {
                message: "unclosed action".to_string(),
                offset: start,
            });
        };

        let raw = &source[body_start..body_start + close];
        let trim_right = raw
            .strip_suffix('-')
            .is_some_and(|rest| rest.ends_with(char::is_whitespace));
        let body = if trim_right { &raw[..raw.len() - 1] } else { raw };

        let end = body_start + close + 2;
        elements.push(Element::Action(Action {
            trim_left,
            trim_right,
            body,
            offset: start,
            newlines: source[start..end].matches('\n').count(),
        }));
        pos = end;
    }

    if pos < source.len() {
        elements.push(Element::Text(&source[pos..]));
    }

    Ok(elements)
}

/// `{{-` trims only when the dash is followed by whitespace; `{{-3}}` is a number
fn is_trim_marker(rest: &str) -> bool {
    let mut chars = rest.chars();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

/// Offset of the closing `}}`, skipping quoted strings and a leading comment
fn find_action_end(body: &str) -> Option<usize> {
    let leading = body.len() - body.trim_start().len();
    if body[leading..].starts_with("/*") {
        let comment_end = body[leading..].find("*/")? + leading + 2;
        return body[comment_end..].find("}}").map(|i| i + comment_end);
    }

    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// `.a.b`
    Field(Vec<String>),
    /// `.`
    Dot,
    /// `$name.a.b`; `$` alone has an empty name
    Var { name: String, path: Vec<String> },
    /// A literal already in MiniJinja form
    Literal(String),
    Ident(String),
    Pipe,
    Open,
    Close,
    Comma,
    Declare,
    Assign,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_signed_number(c: char, next: Option<&char>) -> bool {
    (c == '-' || c == '+') && next.is_some_and(|n| n.is_ascii_digit())
}

fn tokenize(body: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = body.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let read_ident = |i: &mut usize| {
        let start = *i;
        while *i < chars.len() && is_ident_char(chars[*i]) {
            *i += 1;
        }
        chars[start..*i].iter().collect::<String>()
    };

    let read_path = |i: &mut usize| {
        let mut path = Vec::new();
        while *i + 1 < chars.len() && chars[*i] == '.' && is_ident_start(chars[*i + 1]) {
            *i += 1;
            path.push(read_ident(i));
        }
        path
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Declare);
                i += 2;
            }
            '=' => {
                tokens.push(Token::Assign);
                i += 1;
            }
            '"' => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                if i >= chars.len() {
                    return Err("unterminated quoted string".to_string());
                }
                i += 1;
                tokens.push(Token::Literal(chars[start..i].iter().collect()));
            }
            '`' => {
                let start = i + 1;
                i += 1;
                while i < chars.len() && chars[i] != '`' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err("unterminated raw quoted string".to_string());
                }
                let raw: String = chars[start..i].iter().collect();
                i += 1;
                tokens.push(Token::Literal(quote_string(&raw)));
            }
            '\'' => return Err("character constants are not supported".to_string()),
            '$' => {
                i += 1;
                let name = read_ident(&mut i);
                let path = read_path(&mut i);
                tokens.push(Token::Var { name, path });
            }
            '.' => {
                let path = read_path(&mut i);
                if path.is_empty() {
                    if chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) {
                        return Err(format!("bad number syntax at {:?}", body.trim()));
                    }
                    tokens.push(Token::Dot);
                    i += 1;
                } else {
                    tokens.push(Token::Field(path));
                }
            }
            c if c.is_ascii_digit() || is_signed_number(c, chars.get(i + 1)) => {
                let start = i;
                i += 1;
                while i < chars.len() && (is_ident_char(chars[i]) || chars[i] == '.') {
                    i += 1;
                }
                let number: String = chars[start..i].iter().collect();
                tokens.push(Token::Literal(number.trim_start_matches('+').replace('_', "")));
            }
            c if is_ident_start(c) => {
                let ident = read_ident(&mut i);
                tokens.push(match ident.as_str() {
                    "true" | "false" => Token::Literal(ident),
                    "nil" => Token::Literal("none".to_string()),
                    _ => Token::Ident(ident),
                });
            }
            other => return Err(format!("unexpected {:?} in action", other)),
        }
    }

    Ok(tokens)
}

/// A MiniJinja string literal for arbitrary text
fn quote_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    If,
    Range,
    With,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Block::If => "if",
            Block::Range => "range",
            Block::With => "with",
        })
    }
}

struct Frame {
    block: Block,
    /// What `.` refers to inside the block
    dot: Option<String>,
    in_else: bool,
    offset: usize,
}

#[derive(Default)]
struct Translator {
    out: String,
    frames: Vec<Frame>,
    next_id: usize,
}

impl Translator {
    fn text(&mut self, text: &str) {
        self.out
            .push_str(&text.replace("{%", "{{ \"{%\" }}").replace("{#", "{{ \"{#\" }}"));
    }

    /// The current value of `.`; `None` at the top level
    fn dot(&self) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .filter(|frame| !frame.in_else)
            .find_map(|frame| frame.dot.as_deref())
    }

    fn fresh(&mut self) -> String {
        self.next_id += 1;
        format!("_dot{}", self.next_id)
    }

    fn open(&mut self, trim: bool) {
        self.out.push_str(if trim { "{%- " } else { "{% " });
    }

    fn close(&mut self, trim: bool, newlines: usize) {
        self.out.push_str(&"\n".repeat(newlines));
        self.out.push_str(if trim { " -%}" } else { " %}" });
    }

    fn tag(&mut self, action: &Action<'_>, body: &str) {
        self.open(action.trim_left);
        self.out.push_str(body);
        self.close(action.trim_right, action.newlines);
    }

    /// Two tags emitted for one action; trims apply to the outer edges
    fn tags(&mut self, action: &Action<'_>, first: &str, second: &str) {
        self.open(action.trim_left);
        self.out.push_str(first);
        self.close(false, 0);
        self.open(false);
        self.out.push_str(second);
        self.close(action.trim_right, action.newlines);
    }

    fn action(&mut self, action: &Action<'_>) -> Result<()> {
        let body = action.body.trim();

        if body.starts_with("/*") {
            if !body.ends_with("*/") {
                return Err("comment must be the whole action".to_string());
            }
            self.out.push_str(if action.trim_left { "{{- \"\"" } else { "{{ \"\"" });
            self.out.push_str(&"\n".repeat(action.newlines));
            self.out.push_str(if action.trim_right { " -}}" } else { " }}" });
            return Ok(());
        }

        let tokens = tokenize(body)?;
        let keyword = match tokens.first() {
            Some(Token::Ident(name)) => name.as_str(),
            None => return Err("missing value for command".to_string()),
            _ => "",
        };

        match keyword {
            "if" => {
                let condition = self.pipeline(&tokens[1..])?;
                self.frames.push(Frame {
                    block: Block::If,
                    dot: None,
                    in_else: false,
                    offset: action.offset,
                });
                self.tag(action, &format!("if {}", condition));
            }
            "else" => self.else_action(action, &tokens[1..])?,
            "end" => {
                if tokens.len() > 1 {
                    return Err("unexpected arguments to end".to_string());
                }
                let frame = self
                    .frames
                    .pop()
                    .ok_or_else(|| "unexpected {{end}}".to_string())?;
                match frame.block {
                    Block::If => self.tag(action, "endif"),
                    Block::Range => self.tag(action, "endfor"),
                    Block::With => self.tags(action, "endif", "endwith"),
                }
            }
            "range" => self.range(action, &tokens[1..])?,
            "with" => {
                let (var, rest) = declared_var(&tokens[1..]);
                let value = self.pipeline(rest)?;
                let name = match var {
                    Some(name) => name,
                    None => self.fresh(),
                };
                self.frames.push(Frame {
                    block: Block::With,
                    dot: Some(name.clone()),
                    in_else: false,
                    offset: action.offset,
                });
                let with = format!("with {} = {}", name, value);
                self.tags(action, &with, &format!("if {}", name));
            }
            "define" | "template" | "block" | "break" | "continue" => {
                return Err(format!("{{{{{}}}}} is not supported", keyword));
            }
            _ => {
                if let Some((name, rest)) = assignment(&tokens) {
                    let value = self.pipeline(rest)?;
                    self.tag(action, &format!("set {} = {}", name, value));
                } else {
                    let value = self.pipeline(&tokens)?;
                    self.out.push_str(if action.trim_left { "{{- " } else { "{{ " });
                    self.out.push_str(&value);
                    self.out.push_str(&"\n".repeat(action.newlines));
                    self.out.push_str(if action.trim_right { " -}}" } else { " }}" });
                }
            }
        }

        Ok(())
    }

    fn else_action(&mut self, action: &Action<'_>, rest: &[Token]) -> Result<()> {
        let frame = self
            .frames
            .last()
            .ok_or_else(|| "unexpected {{else}}".to_string())?;
        let block = frame.block;

        if frame.in_else {
            return Err(format!("expected end; found {{{{else}}}} after else in {}", block));
        }

        match rest.first() {
            None => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.in_else = true;
                }
                self.tag(action, "else");
            }
            Some(Token::Ident(name)) if name == "if" && block == Block::If => {
                let condition = self.pipeline(&rest[1..])?;
                self.tag(action, &format!("elif {}", condition));
            }
            Some(_) => return Err(format!("unexpected arguments to else in {}", block)),
        }
        Ok(())
    }

    fn range(&mut self, action: &Action<'_>, tokens: &[Token]) -> Result<()> {
        let (index, value, rest) = match tokens {
            [
                Token::Var { name: i, path: ip },
                Token::Comma,
                Token::Var { name: v, path: vp },
                Token::Declare,
                rest @ ..,
            ] if ip.is_empty() && vp.is_empty() => (Some(i.clone()), Some(v.clone()), rest),
            [Token::Var { name: v, path }, Token::Declare, rest @ ..] if path.is_empty() => {
                (None, Some(v.clone()), rest)
            }
            _ => (None, None, tokens),
        };

        let collection = self.pipeline(rest)?;
        let value = match value {
            Some(name) => name,
            None => self.fresh(),
        };
        let index = match index {
            Some(name) => name,
            None => format!("{}_key", value),
        };

        self.frames.push(Frame {
            block: Block::Range,
            dot: Some(value.clone()),
            in_else: false,
            offset: action.offset,
        });
        self.tag(
            action,
            &format!("for {}, {} in {} | entries", index, value, collection),
        );
        Ok(())
    }

    /// Translate `cmd | cmd ...`, feeding each result as the last argument of the next
    fn pipeline(&self, tokens: &[Token]) -> Result<String> {
        let mut result: Option<String> = None;
        for command in split_commands(tokens)? {
            result = Some(self.command(command, result)?);
        }
        result.ok_or_else(|| "missing value for command".to_string())
    }

    fn command(&self, tokens: &[Token], piped: Option<String>) -> Result<String> {
        let operands = split_operands(tokens)?;
        let Some((first, rest)) = operands.split_first() else {
            return Err("missing value for command".to_string());
        };

        if let [Token::Ident(name)] = *first {
            let mut args = rest
                .iter()
                .map(|operand| self.operand(operand))
                .collect::<Result<Vec<_>>>()?;
            args.extend(piped);
            return function(name, args);
        }

        if !rest.is_empty() || piped.is_some() {
            return Err("can't give argument to non-function".to_string());
        }
        self.operand(first)
    }

    fn operand(&self, tokens: &[Token]) -> Result<String> {
        match tokens {
            [Token::Open, inner @ .., Token::Close] => Ok(format!("({})", self.pipeline(inner)?)),
            [Token::Field(path)] => Ok(match self.dot() {
                Some(dot) => format!("{}.{}", dot, path.join(".")),
                None => path.join("."),
            }),
            [Token::Dot] => self
                .dot()
                .map(str::to_string)
                .ok_or_else(|| "`.` is only supported inside range or with".to_string()),
            [Token::Var { name, path }] if name.is_empty() => {
                if path.is_empty() {
                    Err("`$` is only supported with a field, e.g. `$.Key`".to_string())
                } else {
                    Ok(path.join("."))
                }
            }
            [Token::Var { name, path }] => {
                let mut parts = vec![name.clone()];
                parts.extend(path.iter().cloned());
                Ok(parts.join("."))
            }
            [Token::Literal(literal)] => Ok(literal.clone()),
            [Token::Ident(name)] => function(name, Vec::new()),
            _ => Err("unexpected token in operand".to_string()),
        }
    }
}

/// `$x := ...` at the start of `with`
fn declared_var(tokens: &[Token]) -> (Option<String>, &[Token]) {
    match tokens {
        [Token::Var { name, path }, Token::Declare, rest @ ..]
            if path.is_empty() && !name.is_empty() =>
        {
            (Some(name.clone()), rest)
        }
        _ => (None, tokens),
    }
}

/// `$x := ...` or `$x = ...` as a whole action
fn assignment(tokens: &[Token]) -> Option<(&str, &[Token])> {
    match tokens {
        [Token::Var { name, path }, Token::Declare | Token::Assign, rest @ ..]
            if path.is_empty() && !name.is_empty() =>
        {
            Some((name.as_str(), rest))
        }
        _ => None,
    }
}

fn split_commands(tokens: &[Token]) -> Result<Vec<&[Token]>> {
    let mut commands = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Open => depth += 1,
            Token::Close => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "unexpected right paren".to_string())?;
            }
            Token::Pipe if depth == 0 => {
                commands.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err("unclosed left paren".to_string());
    }
    commands.push(&tokens[start..]);

    if commands.iter().any(|command| command.is_empty()) {
        return Err("missing command in pipeline".to_string());
    }
    Ok(commands)
}

/// Group a command's tokens into operands; a parenthesized pipeline is one operand
fn split_operands(tokens: &[Token]) -> Result<Vec<&[Token]>> {
    let mut operands = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        if tokens[i] == Token::Open {
            let mut depth = 0usize;
            let start = i;
            loop {
                match tokens.get(i) {
                    Some(Token::Open) => depth += 1,
                    Some(Token::Close) => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    Some(_) => {}
                    None => return Err("unclosed left paren".to_string()),
                }
                i += 1;
            }
            operands.push(&tokens[start..=i]);
        } else {
            match tokens[i] {
                Token::Close | Token::Comma | Token::Declare | Token::Assign | Token::Pipe => {
                    return Err(format!("unexpected {:?} in command", tokens[i]));
                }
                _ => operands.push(&tokens[i..=i]),
            }
        }
        i += 1;
    }

    Ok(operands)
}

/// Go built-ins map to MiniJinja operators; any other function becomes a
/// filter applied to its last argument (`indent 4 .x` is `x | indent(4)`).
fn function(name: &str, args: Vec<String>) -> Result<String> {
    let binary = |op: &str, args: &[String]| -> Result<String> {
        match args {
            [a, b] => Ok(format!("({} {} {})", a, op, b)),
            _ => Err(format!("wrong number of args for {}: want 2 got {}", name, args.len())),
        }
    };

    match name {
        "eq" => match args.split_first() {
            Some((first, rest)) if !rest.is_empty() => {
                let tests: Vec<String> =
                    rest.iter().map(|arg| format!("{} == {}", first, arg)).collect();
                Ok(format!("({})", tests.join(" or ")))
            }
            _ => Err("missing argument for comparison".to_string()),
        },
        "ne" => binary("!=", &args),
        "lt" => binary("<", &args),
        "le" => binary("<=", &args),
        "gt" => binary(">", &args),
        "ge" => binary(">=", &args),
        "and" | "or" if !args.is_empty() => {
            Ok(format!("({})", args.join(&format!(" {} ", name))))
        }
        "not" => match args.as_slice() {
            [a] => Ok(format!("(not {})", a)),
            _ => Err(format!("wrong number of args for not: want 1 got {}", args.len())),
        },
        "len" => match args.as_slice() {
            [a] => Ok(format!("({} | length)", a)),
            _ => Err(format!("wrong number of args for len: want 1 got {}", args.len())),
        },
        "index" => match args.split_first() {
            Some((collection, keys)) => Ok(keys
                .iter()
                .fold(collection.clone(), |acc, key| format!("{}[{}]", acc, key))),
            None => Err("wrong number of args for index: want at least 1 got 0".to_string()),
        },
        "print" if !args.is_empty() => Ok(format!("({})", args.join(" ~ "))),
        _ => match args.split_last() {
            None => Ok(format!("{}()", name)),
            Some((last, [])) => Ok(format!("({} | {})", last, name)),
            Some((last, rest)) => Ok(format!("({} | {}({}))", last, name, rest.join(", "))),
        },
    }
}
