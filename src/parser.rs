//! Dual-surface parser: one recursive descent over a shared token stream,
//! dispatching per line between the English and Korean grammars and
//! constructing a single set of AST nodes.

use std::collections::HashMap;

use crate::ast::*;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{DaisyError, DaisyResult};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::source::{Surface, SourceFile};
use crate::span::Span;

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    next_id: ExprId,
    surfaces: HashMap<u32, Surface>,
    errors: Vec<Diagnostic>,
    _source: &'a SourceFile,
}

/// Parses one source file into a module, collecting as many syntax errors
/// as statement-boundary recovery allows.
pub fn parse(source: &SourceFile) -> DaisyResult<Module> {
    let tokens = Lexer::new(source).tokenize()?;
    let surfaces = source
        .lines
        .iter()
        .filter_map(|l| l.surface.map(|s| (l.line, s)))
        .collect();
    let mut parser = Parser {
        tokens,
        pos: 0,
        next_id: 0,
        surfaces,
        errors: Vec::new(),
        _source: source,
    };
    let module = parser.parse_module();
    if parser.errors.is_empty() {
        module.map_err(|d| DaisyError::Diagnostics(vec![d]))
    } else {
        if let Err(d) = module {
            parser.errors.push(d);
        }
        Err(DaisyError::Diagnostics(parser.errors))
    }
}

type Parse<T> = Result<T, Diagnostic>;

impl<'a> Parser<'a> {
    fn parse_module(&mut self) -> Parse<Module> {
        self.skip_newlines();
        let keyword = self.expect_ident()?;
        if !matches!(keyword.lexeme.as_str(), "module" | "모듈") {
            return Err(self.error_at(&keyword, "first line must declare the module"));
        }
        let name = self.expect_ident()?;
        self.expect_kind(TokenKind::Newline)?;
        let body = self.parse_block();
        let span = keyword.span.merge(name.span);
        Ok(Module { name: name.lexeme, body, span })
    }

    /// Statements until DEDENT/EOF; consumes the closing DEDENT. Recovers at
    /// statement boundaries so one bad line does not hide the rest.
    fn parse_block(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        while !self.peek_kind(&TokenKind::Eof) && !self.peek_kind(&TokenKind::Dedent) {
            if self.peek_kind(&TokenKind::Newline) {
                self.advance();
                continue;
            }
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(diag) => {
                    self.errors.push(diag);
                    self.sync_to_stmt_boundary();
                }
            }
        }
        if self.peek_kind(&TokenKind::Dedent) {
            self.advance();
        }
        stmts
    }

    fn parse_stmt(&mut self) -> Parse<Stmt> {
        let tok = self.peek().clone();
        let lock = self.surfaces.get(&tok.span.line).copied();
        let korean_ok = lock != Some(Surface::English);
        let english_ok = lock != Some(Surface::Korean);

        if (english_ok && (tok.is_word("export") || tok.is_word("public")))
            || (korean_ok && tok.is_word("공개"))
        {
            self.advance();
            return self.parse_public_item(true);
        }
        if (english_ok && tok.is_word("private")) || (korean_ok && tok.is_word("비공개")) {
            self.advance();
            return self.parse_public_item(false);
        }
        if (english_ok && (tok.is_word("import") || tok.is_word("use")))
            || (korean_ok && (tok.is_word("사용") || tok.is_word("사용한다") || tok.is_word("모듈")))
        {
            return self.parse_import().map(Stmt::Import);
        }
        if (english_ok && tok.is_word("extern")) || (korean_ok && tok.is_word("외부")) {
            return self.parse_extern(false).map(Stmt::Extern);
        }
        if (english_ok && tok.is_word("trait")) || (korean_ok && tok.is_word("트레잇")) {
            return self.parse_trait(false).map(Stmt::Trait);
        }
        if (english_ok && tok.is_word("impl")) || (korean_ok && tok.is_word("구현")) {
            return self.parse_impl().map(Stmt::Impl);
        }
        if (english_ok && tok.is_word("struct")) || (korean_ok && tok.is_word("구조체")) {
            return self.parse_struct(false).map(Stmt::Struct);
        }
        if (english_ok && tok.is_word("enum")) || (korean_ok && tok.is_word("열거형")) {
            return self.parse_enum(false).map(Stmt::Enum);
        }
        if (english_ok && tok.is_word("fn")) || (korean_ok && tok.is_word("함수")) {
            return self.parse_function(false).map(Stmt::Func);
        }
        if (english_ok && tok.is_word("while")) || (korean_ok && tok.is_word("동안")) {
            return self.parse_while();
        }
        if (english_ok && tok.is_word("continue")) || (korean_ok && tok.is_word("계속한다")) {
            self.advance();
            self.expect_kind(TokenKind::Newline)?;
            return Ok(Stmt::Continue { span: tok.span });
        }
        if (english_ok && tok.is_word("break")) || (korean_ok && tok.is_word("중단한다")) {
            self.advance();
            self.expect_kind(TokenKind::Newline)?;
            return Ok(Stmt::Break { span: tok.span });
        }
        if (english_ok && tok.is_word("unsafe")) || (korean_ok && tok.is_word("위험")) {
            return self.parse_unsafe();
        }
        if (english_ok && tok.is_word("if"))
            || (korean_ok && (tok.is_word("만약") || self.line_ends_with_before_colon("이면")))
        {
            return self.parse_if();
        }
        if (english_ok && tok.is_word("match")) || (korean_ok && tok.is_word("맞춤")) {
            return self.parse_match();
        }
        if (english_ok && tok.is_word("repeat")) || (korean_ok && self.line_contains(&["반복한다"])) {
            return self.parse_repeat();
        }
        if (english_ok && tok.is_word("set")) || (korean_ok && self.line_contains(&["설정한다"])) {
            return self.parse_assign();
        }
        if english_ok && tok.is_word("let") {
            return self.parse_let();
        }
        if (english_ok && tok.is_word("add") && self.line_contains(&["to"]))
            || (korean_ok && self.line_contains(&["더한다"]))
        {
            return self.parse_add_assign();
        }
        if (english_ok && tok.is_word("print")) || (korean_ok && self.line_contains(&["출력한다"])) {
            return self.parse_print();
        }
        if (english_ok && tok.is_word("return")) || (korean_ok && self.line_contains(&["반환한다"])) {
            return self.parse_return();
        }
        if korean_ok && self.line_contains(&["생성한다", "바이트"]) {
            return self.parse_buffer_create_korean();
        }
        if korean_ok && self.line_contains(&["빌려온다"]) && self.line_has_particles(&["부터", "까지"]) {
            return self.parse_borrow_slice_korean();
        }
        if korean_ok && self.line_contains(&["이동한다"]) {
            return self.parse_move_korean();
        }
        if (english_ok && tok.is_word("release")) || (korean_ok && self.line_contains(&["해제한다"])) {
            return self.parse_release();
        }
        Err(self.error_at(&tok, "unrecognized statement"))
    }

    fn parse_public_item(&mut self, is_public: bool) -> Parse<Stmt> {
        let next = self.peek().clone();
        if next.is_word("extern") || next.is_word("외부") {
            return self.parse_extern(is_public).map(Stmt::Extern);
        }
        if next.is_word("trait") || next.is_word("트레잇") {
            return self.parse_trait(is_public).map(Stmt::Trait);
        }
        if next.is_word("struct") || next.is_word("구조체") {
            return self.parse_struct(is_public).map(Stmt::Struct);
        }
        if next.is_word("enum") || next.is_word("열거형") {
            return self.parse_enum(is_public).map(Stmt::Enum);
        }
        if next.is_word("fn") || next.is_word("함수") {
            return self.parse_function(is_public).map(Stmt::Func);
        }
        Err(self.error_at(&next, "visibility must be followed by fn, struct, enum, trait or extern"))
    }

    fn parse_import(&mut self) -> Parse<Import> {
        let start = self.advance();
        let is_use = matches!(start.lexeme.as_str(), "use" | "사용" | "사용한다");
        if start.is_word("모듈")
            && matches!(self.peek().kind, TokenKind::Particle)
            && matches!(self.peek().lexeme.as_str(), "을" | "를")
        {
            self.advance();
        }
        let module_tok = self.advance();
        let module = match &module_tok.kind {
            TokenKind::Str(s) => s.clone(),
            TokenKind::Ident | TokenKind::Keyword => module_tok.lexeme.clone(),
            _ => return Err(self.error_at(&module_tok, "expected module name")),
        };
        let mut alias = None;
        if self.peek().is_word("as") || self.peek().is_word("별칭") {
            self.advance();
            // `별칭으로 x` splits to 별칭 + 으로 + x
            if matches!(self.peek().kind, TokenKind::Particle)
                && matches!(self.peek().lexeme.as_str(), "로" | "으로")
            {
                self.advance();
            }
            let alias_tok = self.expect_ident()?;
            alias = Some(alias_tok.lexeme);
        }
        // the Korean form may carry a trailing verb: ... x로 가져온다
        if matches!(self.peek().kind, TokenKind::Particle)
            && matches!(self.peek().lexeme.as_str(), "로" | "으로")
        {
            self.advance();
        }
        if self.peek().is_word("가져온다") {
            self.advance();
        }
        self.expect_kind(TokenKind::Newline)?;
        Ok(Import { module, alias, is_use, span: start.span.merge(module_tok.span) })
    }

    fn parse_extern(&mut self, is_public: bool) -> Parse<ExternFunctionDef> {
        let start = self.advance();
        if start.is_word("extern") {
            let fn_tok = self.advance();
            if !fn_tok.is_word("fn") {
                return Err(self.error_at(&fn_tok, "expected 'fn' after 'extern'"));
            }
        } else {
            let fn_tok = self.advance();
            if !fn_tok.is_word("함수") {
                return Err(self.error_at(&fn_tok, "expected '함수' after '외부'"));
            }
        }
        let name = self.expect_ident()?;
        let params = self.parse_params()?;
        self.expect_kind(TokenKind::Arrow)?;
        let return_type = self.parse_type_ref()?;
        self.expect_kind(TokenKind::Newline)?;
        Ok(ExternFunctionDef {
            name: name.lexeme,
            params,
            return_type,
            is_public,
            span: start.span.merge(name.span),
        })
    }

    fn parse_struct(&mut self, is_public: bool) -> Parse<StructDef> {
        let start = self.advance();
        let name = self.expect_ident()?;
        let type_params = self.parse_type_params()?;
        self.expect_punct(":")?;
        self.expect_kind(TokenKind::Newline)?;
        self.expect_kind(TokenKind::Indent)?;
        let mut fields = Vec::new();
        while !self.peek_kind(&TokenKind::Dedent) && !self.peek_kind(&TokenKind::Eof) {
            if self.peek_kind(&TokenKind::Newline) {
                self.advance();
                continue;
            }
            let field_name = self.expect_ident()?;
            self.expect_punct(":")?;
            let field_type = self.parse_type_ref()?;
            self.expect_kind(TokenKind::Newline)?;
            fields.push(StructField {
                name: field_name.lexeme,
                type_ref: field_type,
                span: field_name.span,
            });
        }
        if self.peek_kind(&TokenKind::Dedent) {
            self.advance();
        }
        Ok(StructDef {
            name: name.lexeme,
            type_params,
            fields,
            is_public,
            span: start.span.merge(name.span),
        })
    }

    fn parse_enum(&mut self, is_public: bool) -> Parse<EnumDef> {
        let start = self.advance();
        let name = self.expect_ident()?;
        let type_params = self.parse_type_params()?;
        self.expect_punct(":")?;
        self.expect_kind(TokenKind::Newline)?;
        self.expect_kind(TokenKind::Indent)?;
        let mut cases = Vec::new();
        while !self.peek_kind(&TokenKind::Dedent) && !self.peek_kind(&TokenKind::Eof) {
            if self.peek_kind(&TokenKind::Newline) {
                self.advance();
                continue;
            }
            let case_tok = self.advance();
            if !case_tok.is_word("case") && !case_tok.is_word("케이스") {
                return Err(self.error_at(&case_tok, "expected case in enum"));
            }
            let case_name = self.expect_ident()?;
            let mut payload = None;
            if self.peek_is_punct(":") {
                self.advance();
                payload = Some(self.parse_type_ref()?);
            }
            self.expect_kind(TokenKind::Newline)?;
            cases.push(EnumCase {
                name: case_name.lexeme,
                payload,
                span: case_tok.span.merge(case_name.span),
            });
        }
        if self.peek_kind(&TokenKind::Dedent) {
            self.advance();
        }
        Ok(EnumDef {
            name: name.lexeme,
            type_params,
            cases,
            is_public,
            span: start.span.merge(name.span),
        })
    }

    fn parse_trait(&mut self, is_public: bool) -> Parse<TraitDef> {
        let start = self.advance();
        let name = self.expect_ident()?;
        let type_params = self.parse_type_params()?;
        self.expect_punct(":")?;
        self.expect_kind(TokenKind::Newline)?;
        self.expect_kind(TokenKind::Indent)?;
        let mut methods = Vec::new();
        while !self.peek_kind(&TokenKind::Dedent) && !self.peek_kind(&TokenKind::Eof) {
            if self.peek_kind(&TokenKind::Newline) {
                self.advance();
                continue;
            }
            let line = self.consume_line();
            methods.push(self.parse_trait_method(&line)?);
            self.expect_kind(TokenKind::Newline)?;
        }
        if self.peek_kind(&TokenKind::Dedent) {
            self.advance();
        }
        Ok(TraitDef {
            name: name.lexeme,
            type_params,
            methods,
            is_public,
            span: start.span.merge(name.span),
        })
    }

    fn parse_trait_method(&mut self, tokens: &[Token]) -> Parse<TraitMethod> {
        let first = tokens
            .first()
            .ok_or_else(|| self.error_here("empty trait method"))?;
        if !first.is_word("fn") && !first.is_word("함수") {
            return Err(self.error_at(first, "trait method must start with fn"));
        }
        let name = tokens
            .get(1)
            .ok_or_else(|| self.error_at(first, "trait method missing name"))?;
        let mut idx = 2;
        if tokens.get(idx).map(|t| t.lexeme.as_str()) != Some("(") {
            return Err(self.error_at(name, "trait method missing parameters"));
        }
        idx += 1;
        let mut params = Vec::new();
        if tokens.get(idx).map(|t| t.lexeme.as_str()) == Some(")") {
            idx += 1;
        } else {
            loop {
                let param_name = tokens
                    .get(idx)
                    .ok_or_else(|| self.error_at(name, "trait method parameters unterminated"))?
                    .clone();
                idx += 1;
                if tokens.get(idx).map(|t| t.lexeme.as_str()) != Some(":") {
                    return Err(self.error_at(&param_name, "trait parameter missing ':'"));
                }
                idx += 1;
                let (param_type, next) = self.parse_type_ref_tokens(tokens, idx)?;
                idx = next;
                params.push(Param {
                    name: param_name.lexeme.clone(),
                    type_ref: param_type,
                    span: param_name.span,
                });
                match tokens.get(idx).map(|t| t.lexeme.as_str()) {
                    Some(",") => idx += 1,
                    Some(")") => {
                        idx += 1;
                        break;
                    }
                    _ => return Err(self.error_at(&param_name, "expected ',' or ')' in parameters")),
                }
            }
        }
        if tokens.get(idx).map(|t| t.kind.clone()) != Some(TokenKind::Arrow) {
            return Err(self.error_at(name, "trait method missing return type"));
        }
        idx += 1;
        let (return_type, _) = self.parse_type_ref_tokens(tokens, idx)?;
        Ok(TraitMethod {
            name: name.lexeme.clone(),
            params,
            return_type,
            span: span_of(tokens),
        })
    }

    fn parse_impl(&mut self) -> Parse<ImplDef> {
        let mut tokens = self.consume_line();
        let start_span = span_of(&tokens);
        if tokens.last().map(|t| t.lexeme.as_str()) == Some(":") {
            tokens.pop();
        }
        let mut trait_name = None;
        let for_type_tokens: Vec<Token>;
        if let Some(idx_for) = tokens.iter().position(|t| t.is_word("for") || t.is_word("대상")) {
            if idx_for >= 2 {
                trait_name = Some(tokens[1].lexeme.clone());
            }
            for_type_tokens = tokens[idx_for + 1..].to_vec();
        } else {
            for_type_tokens = tokens[1..].to_vec();
        }
        if for_type_tokens.is_empty() {
            return Err(self.error_here("impl requires a target type"));
        }
        let (for_type, _) = self.parse_type_ref_tokens(&for_type_tokens, 0)?;
        self.expect_kind(TokenKind::Newline)?;
        self.expect_kind(TokenKind::Indent)?;
        let mut methods = Vec::new();
        while !self.peek_kind(&TokenKind::Dedent) && !self.peek_kind(&TokenKind::Eof) {
            if self.peek_kind(&TokenKind::Newline) {
                self.advance();
                continue;
            }
            methods.push(self.parse_function(false)?);
        }
        if self.peek_kind(&TokenKind::Dedent) {
            self.advance();
        }
        Ok(ImplDef { trait_name, for_type, methods, span: start_span })
    }

    fn parse_function(&mut self, is_public: bool) -> Parse<FunctionDef> {
        let start = self.peek().clone();
        if start.is_word("fn") {
            self.advance();
            let name = self.expect_ident()?;
            let type_params = self.parse_type_params()?;
            let params = self.parse_params()?;
            self.expect_kind(TokenKind::Arrow)?;
            let return_type = self.parse_type_ref()?;
            self.expect_punct(":")?;
            self.expect_kind(TokenKind::Newline)?;
            self.expect_kind(TokenKind::Indent)?;
            let body = self.parse_block();
            return Ok(FunctionDef {
                name: name.lexeme,
                type_params,
                params,
                return_type,
                body,
                is_public,
                span: start.span.merge(name.span),
            });
        }
        // Korean header: `함수 NAME 정의:` or the long `정의한다` form.
        let tokens = self.consume_line();
        let (name, params, return_type) = self.parse_korean_function_header(&tokens)?;
        self.expect_kind(TokenKind::Newline)?;
        self.expect_kind(TokenKind::Indent)?;
        let body = self.parse_block();
        Ok(FunctionDef {
            name,
            type_params: Vec::new(),
            params,
            return_type,
            body,
            is_public,
            span: span_of(&tokens),
        })
    }

    fn parse_korean_function_header(
        &mut self,
        tokens: &[Token],
    ) -> Parse<(String, Vec<Param>, TypeRef)> {
        let span = span_of(tokens);
        // `함수 NAME 정의:` — unit return, no parameters. The entry function
        // is special-cased to int so both surfaces emit the same main.
        if tokens.len() >= 3 && tokens[0].is_word("함수") && tokens[2].is_word("정의") {
            let name = tokens[1].lexeme.clone();
            let ret = if name == "main" { "int" } else { "unit" };
            return Ok((name, Vec::new(), TypeRef::named(ret, tokens[1].span)));
        }
        // `함수 정의한다 NAME은 P : T 받고 RET를 반환한다`
        let name_tok = tokens
            .iter()
            .position(|t| t.is_word("정의한다"))
            .and_then(|i| tokens.get(i + 1))
            .or_else(|| tokens.get(1))
            .ok_or_else(|| self.error_here("function definition missing name"))?;
        let return_tok = self.extract_korean_return_type(tokens);
        let params = self.extract_korean_params(tokens)?;
        Ok((
            name_tok.lexeme.clone(),
            params,
            TypeRef::named(return_tok.map(|t| t.lexeme.clone()).unwrap_or_else(|| "unit".into()), span),
        ))
    }

    fn extract_korean_return_type<'t>(&self, tokens: &'t [Token]) -> Option<&'t Token> {
        let idx = tokens.iter().position(|t| t.is_word("반환한다"))?;
        let mut j = idx.checked_sub(1)?;
        while tokens[j].kind == TokenKind::Particle {
            j = j.checked_sub(1)?;
        }
        Some(&tokens[j])
    }

    fn extract_korean_params(&mut self, tokens: &[Token]) -> Parse<Vec<Param>> {
        let Some(end) = tokens.iter().position(|t| t.is_word("받고")) else {
            return Ok(Vec::new());
        };
        let Some(start) = tokens.iter().position(|t| t.is_particle("은")) else {
            return Ok(Vec::new());
        };
        let slice = &tokens[start + 1..end];
        if slice.is_empty() || (slice.len() == 1 && slice[0].is_word("아무것도")) {
            return Ok(Vec::new());
        }
        if slice.len() >= 3 && slice[1].lexeme == ":" {
            return Ok(vec![Param {
                name: slice[0].lexeme.clone(),
                type_ref: TypeRef::named(slice[2].lexeme.clone(), slice[2].span),
                span: slice[0].span,
            }]);
        }
        Ok(Vec::new())
    }

    fn parse_if(&mut self) -> Parse<Stmt> {
        let cond;
        let span;
        if self.peek().is_word("if") {
            let start = self.advance();
            cond = self.parse_expr_until_punct(":")?;
            self.expect_punct(":")?;
            span = start.span;
        } else {
            let tokens = self.consume_line();
            span = span_of(&tokens);
            cond = self.parse_condition(&tokens)?;
        }
        self.expect_kind(TokenKind::Newline)?;
        self.expect_kind(TokenKind::Indent)?;
        let then_body = self.parse_block();
        let else_body = self.parse_if_tail()?;
        Ok(Stmt::If { cond, then_body, else_body, span })
    }

    fn parse_if_tail(&mut self) -> Parse<Option<Vec<Stmt>>> {
        if self.peek().is_word("elif") {
            let start = self.advance();
            let cond = self.parse_expr_until_punct(":")?;
            self.expect_punct(":")?;
            self.expect_kind(TokenKind::Newline)?;
            self.expect_kind(TokenKind::Indent)?;
            let body = self.parse_block();
            let tail = self.parse_if_tail()?;
            return Ok(Some(vec![Stmt::If {
                cond,
                then_body: body,
                else_body: tail,
                span: start.span,
            }]));
        }
        if self.peek().is_word("else") {
            self.advance();
            self.expect_punct(":")?;
            self.expect_kind(TokenKind::Newline)?;
            self.expect_kind(TokenKind::Indent)?;
            return Ok(Some(self.parse_block()));
        }
        if self.peek().is_word("아니면") {
            let tokens = self.consume_line();
            if tokens.len() == 2 && tokens[1].lexeme == ":" {
                self.expect_kind(TokenKind::Newline)?;
                self.expect_kind(TokenKind::Indent)?;
                return Ok(Some(self.parse_block()));
            }
            let cond = self.parse_condition(&tokens[1..])?;
            self.expect_kind(TokenKind::Newline)?;
            self.expect_kind(TokenKind::Indent)?;
            let body = self.parse_block();
            let tail = self.parse_if_tail()?;
            return Ok(Some(vec![Stmt::If {
                cond,
                then_body: body,
                else_body: tail,
                span: span_of(&tokens),
            }]));
        }
        Ok(None)
    }

    /// Strips `만약` prefixes and `이면:` tails before expression parsing.
    fn parse_condition(&mut self, tokens: &[Token]) -> Parse<Expr> {
        let mut slice = tokens;
        while let Some(last) = slice.last() {
            if last.lexeme == ":" || last.is_word("이면") {
                slice = &slice[..slice.len() - 1];
            } else {
                break;
            }
        }
        if slice.first().map(|t| t.is_word("만약")).unwrap_or(false) {
            slice = &slice[1..];
        }
        self.parse_expr_tokens(slice)
    }

    fn parse_match(&mut self) -> Parse<Stmt> {
        let start = self.advance();
        let scrutinee = self.parse_expr_until_punct(":")?;
        self.expect_punct(":")?;
        self.expect_kind(TokenKind::Newline)?;
        self.expect_kind(TokenKind::Indent)?;
        let mut arms = Vec::new();
        let mut else_body = None;
        while !self.peek_kind(&TokenKind::Dedent) && !self.peek_kind(&TokenKind::Eof) {
            if self.peek_kind(&TokenKind::Newline) {
                self.advance();
                continue;
            }
            let tok = self.peek().clone();
            if tok.is_word("case") || tok.is_word("케이스") {
                let mut tokens = self.consume_line();
                if tokens.last().map(|t| t.lexeme.as_str()) == Some(":") {
                    tokens.pop();
                }
                let guard_idx = tokens
                    .iter()
                    .position(|t| t.is_word("if") || t.is_word("만약"));
                let (pattern_tokens, guard) = match guard_idx {
                    Some(idx) => {
                        let guard = if tokens[idx].is_word("만약") {
                            self.parse_condition(&tokens[idx + 1..])?
                        } else {
                            self.parse_expr_tokens(&tokens[idx + 1..])?
                        };
                        (&tokens[1..idx], Some(guard))
                    }
                    None => (&tokens[1..], None),
                };
                let pattern = self.parse_pattern_tokens(pattern_tokens)?;
                self.expect_kind(TokenKind::Newline)?;
                self.expect_kind(TokenKind::Indent)?;
                let body = self.parse_block();
                arms.push(MatchArm { pattern, guard, body, span: tok.span });
                continue;
            }
            if tok.is_word("else") || tok.is_word("아니면") {
                self.advance();
                self.expect_punct(":")?;
                self.expect_kind(TokenKind::Newline)?;
                self.expect_kind(TokenKind::Indent)?;
                else_body = Some(self.parse_block());
                continue;
            }
            return Err(self.error_at(&tok, "expected case or else in match"));
        }
        if self.peek_kind(&TokenKind::Dedent) {
            self.advance();
        }
        Ok(Stmt::Match { scrutinee, arms, else_body, span: start.span })
    }

    fn parse_repeat(&mut self) -> Parse<Stmt> {
        if self.peek().is_word("repeat") {
            let start = self.advance();
            if self.peek_is_punct(":") {
                return Err(self.error_at(&start, "repeat requires an explicit count expression"));
            }
            let count = self.parse_expr_until_punct(":")?;
            self.expect_punct(":")?;
            self.expect_kind(TokenKind::Newline)?;
            self.expect_kind(TokenKind::Indent)?;
            let body = self.parse_block();
            return Ok(Stmt::Repeat { count, body, span: start.span });
        }
        // `N번 반복한다:`
        let tokens = self.consume_line();
        let span = span_of(&tokens);
        if tokens.len() < 4 {
            return Err(Diagnostic::new(
                DiagnosticKind::SyntaxError,
                "반복한다 requires an explicit count expression",
                Some(span),
            ));
        }
        let count = self.parse_expr_tokens(&tokens[..tokens.len() - 3])?;
        self.expect_kind(TokenKind::Newline)?;
        self.expect_kind(TokenKind::Indent)?;
        let body = self.parse_block();
        Ok(Stmt::Repeat { count, body, span })
    }

    fn parse_while(&mut self) -> Parse<Stmt> {
        if self.peek().is_word("while") {
            let start = self.advance();
            let cond = self.parse_expr_until_punct(":")?;
            self.expect_punct(":")?;
            self.expect_kind(TokenKind::Newline)?;
            self.expect_kind(TokenKind::Indent)?;
            let body = self.parse_block();
            return Ok(Stmt::While { cond, body, span: start.span });
        }
        // `동안 COND:`
        let tokens = self.consume_line();
        let span = span_of(&tokens);
        if tokens.len() < 3 {
            return Err(Diagnostic::new(
                DiagnosticKind::SyntaxError,
                "동안 requires a condition",
                Some(span),
            ));
        }
        let cond = self.parse_expr_tokens(&tokens[1..tokens.len() - 1])?;
        self.expect_kind(TokenKind::Newline)?;
        self.expect_kind(TokenKind::Indent)?;
        let body = self.parse_block();
        Ok(Stmt::While { cond, body, span })
    }

    fn parse_unsafe(&mut self) -> Parse<Stmt> {
        let start = self.advance();
        let mut reason = None;
        if let TokenKind::Str(s) = &self.peek().kind {
            reason = Some(s.clone());
            self.advance();
        }
        self.expect_punct(":")?;
        self.expect_kind(TokenKind::Newline)?;
        self.expect_kind(TokenKind::Indent)?;
        let body = self.parse_block();
        if reason.is_none() {
            self.errors.push(Diagnostic::new(
                DiagnosticKind::UnsafeWithoutJustification,
                "unsafe block requires a justification string",
                Some(start.span),
            ));
        }
        Ok(Stmt::Unsafe { reason, body, span: start.span })
    }

    fn parse_let(&mut self) -> Parse<Stmt> {
        let start = self.advance();
        let name = self.expect_ident()?;
        let mut ty = None;
        if self.peek_is_punct(":") {
            self.advance();
            ty = Some(self.parse_type_ref()?);
        }
        self.expect_op("=")?;
        let init = self.parse_expr_until_newline()?;
        self.expect_kind(TokenKind::Newline)?;
        Ok(Stmt::Let { name: name.lexeme, ty, init, span: start.span.merge(name.span) })
    }

    fn parse_assign(&mut self) -> Parse<Stmt> {
        if self.peek().is_word("set") {
            let start = self.advance();
            let target = self.parse_expr_until_op("=")?;
            self.expect_op("=")?;
            let value = self.parse_expr_until_newline()?;
            self.expect_kind(TokenKind::Newline)?;
            return Ok(self.bind_or_assign(target, value, start.span));
        }
        // `X를 Y로 설정한다`
        let tokens = self.consume_line();
        let span = span_of(&tokens);
        let part_idx = tokens
            .iter()
            .position(|t| t.is_particle("를") || t.is_particle("을"))
            .ok_or_else(|| Diagnostic::new(
                DiagnosticKind::SyntaxError,
                "설정한다 requires a 를/을 particle after the target",
                Some(span),
            ))?;
        if tokens.len() < part_idx + 4 {
            return Err(Diagnostic::new(
                DiagnosticKind::SyntaxError,
                "설정한다 requires a value",
                Some(span),
            ));
        }
        let target = self.parse_expr_tokens(&tokens[..part_idx])?;
        let value = self.parse_expr_tokens(&tokens[part_idx + 1..tokens.len() - 2])?;
        self.expect_kind(TokenKind::Newline)?;
        Ok(self.bind_or_assign(target, value, span))
    }

    fn bind_or_assign(&mut self, target: Expr, value: Expr, span: Span) -> Stmt {
        match target.as_name() {
            Some(name) => Stmt::Let { name: name.to_string(), ty: None, init: value, span },
            None => Stmt::Assign { target, value, span },
        }
    }

    fn parse_add_assign(&mut self) -> Parse<Stmt> {
        if self.peek().is_word("add") {
            let start = self.advance();
            let value = self.parse_expr_until_word("to")?;
            self.advance(); // `to`
            let target = self.parse_expr_until_newline()?;
            self.expect_kind(TokenKind::Newline)?;
            return Ok(Stmt::AddAssign { target, value, span: start.span });
        }
        // `X에 V를 더한다`
        let tokens = self.consume_line();
        let span = span_of(&tokens);
        if tokens.len() < 5 {
            return Err(Diagnostic::new(
                DiagnosticKind::SyntaxError,
                "더한다 requires a target and a value",
                Some(span),
            ));
        }
        let target = self.parse_expr_tokens(&tokens[..1])?;
        let value = self.parse_expr_tokens(&tokens[2..tokens.len() - 2])?;
        self.expect_kind(TokenKind::Newline)?;
        Ok(Stmt::AddAssign { target, value, span })
    }

    fn parse_print(&mut self) -> Parse<Stmt> {
        if self.peek().is_word("print") {
            let start = self.advance();
            let value = self.parse_expr_until_newline()?;
            self.expect_kind(TokenKind::Newline)?;
            return Ok(Stmt::Print { value, span: start.span });
        }
        let tokens = self.consume_line();
        let span = span_of(&tokens);
        if tokens.len() < 3 {
            return Err(Diagnostic::new(
                DiagnosticKind::SyntaxError,
                "출력한다 requires a value",
                Some(span),
            ));
        }
        let value = self.parse_expr_tokens(&tokens[..tokens.len() - 2])?;
        self.expect_kind(TokenKind::Newline)?;
        Ok(Stmt::Print { value, span })
    }

    fn parse_return(&mut self) -> Parse<Stmt> {
        if self.peek().is_word("return") {
            let start = self.advance();
            if self.peek_kind(&TokenKind::Newline) {
                self.advance();
                return Ok(Stmt::Return { value: None, span: start.span });
            }
            let value = self.parse_expr_until_newline()?;
            self.expect_kind(TokenKind::Newline)?;
            return Ok(Stmt::Return { value: Some(value), span: start.span });
        }
        let tokens = self.consume_line();
        let span = span_of(&tokens);
        if tokens.len() == 1 {
            self.expect_kind(TokenKind::Newline)?;
            return Ok(Stmt::Return { value: None, span });
        }
        let value = self.parse_expr_tokens(&tokens[..tokens.len() - 2])?;
        self.expect_kind(TokenKind::Newline)?;
        Ok(Stmt::Return { value: Some(value), span })
    }

    /// `B를 N바이트로 생성한다` — same AST as `let B = buffer(N)`.
    fn parse_buffer_create_korean(&mut self) -> Parse<Stmt> {
        let tokens = self.consume_line();
        let span = span_of(&tokens);
        if tokens.len() < 5 {
            return Err(Diagnostic::new(
                DiagnosticKind::SyntaxError,
                "생성한다 requires a name and a byte size",
                Some(span),
            ));
        }
        let name = tokens[0].lexeme.clone();
        let size = self.parse_expr_tokens(&tokens[2..3])?;
        self.expect_kind(TokenKind::Newline)?;
        let init = self.expr(ExprKind::BufferCreate { size: Box::new(size) }, span);
        Ok(Stmt::Let { name, ty: None, init, span })
    }

    /// `V를 B의 A부터 C까지로 빌려온다(불변|가변)` — same AST as
    /// `let V = borrow [mut] B[A..C]`.
    fn parse_borrow_slice_korean(&mut self) -> Parse<Stmt> {
        let tokens = self.consume_line();
        let span = span_of(&tokens);
        if tokens.len() < 8 {
            return Err(Diagnostic::new(
                DiagnosticKind::SyntaxError,
                "빌려온다 requires a buffer and a 부터/까지 range",
                Some(span),
            ));
        }
        let name = tokens[0].lexeme.clone();
        let buffer = self.parse_expr_tokens(&tokens[2..3])?;
        let start = self.parse_expr_tokens(&tokens[4..5])?;
        let end = self.parse_expr_tokens(&tokens[6..7])?;
        let mutable = tokens[tokens.len() - 2].is_word("가변");
        self.expect_kind(TokenKind::Newline)?;
        let init = self.expr(
            ExprKind::BorrowRange {
                buffer: Box::new(buffer),
                start: Box::new(start),
                end: Box::new(end),
                mutable,
            },
            span,
        );
        Ok(Stmt::Let { name, ty: None, init, span })
    }

    /// `A를 B로 이동한다` — same AST as `let B = move A`.
    fn parse_move_korean(&mut self) -> Parse<Stmt> {
        let tokens = self.consume_line();
        let span = span_of(&tokens);
        if tokens.len() < 5 {
            return Err(Diagnostic::new(
                DiagnosticKind::SyntaxError,
                "이동한다 requires a source and a destination",
                Some(span),
            ));
        }
        let src = self.parse_expr_tokens(&tokens[..1])?;
        let dst = tokens[2].lexeme.clone();
        self.expect_kind(TokenKind::Newline)?;
        let init = self.expr(ExprKind::Move { value: Box::new(src) }, span);
        Ok(Stmt::Let { name: dst, ty: None, init, span })
    }

    fn parse_release(&mut self) -> Parse<Stmt> {
        if self.peek().is_word("release") {
            let start = self.advance();
            let target = self.parse_expr_until_newline()?;
            self.expect_kind(TokenKind::Newline)?;
            return Ok(Stmt::Release { target, span: start.span });
        }
        let tokens = self.consume_line();
        let span = span_of(&tokens);
        let target = self.parse_expr_tokens(&tokens[..1])?;
        self.expect_kind(TokenKind::Newline)?;
        Ok(Stmt::Release { target, span })
    }

    // === parameter / type parsing ===

    fn parse_params(&mut self) -> Parse<Vec<Param>> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        if self.peek_is_punct(")") {
            self.advance();
            return Ok(params);
        }
        loop {
            let name = self.expect_ident()?;
            self.expect_punct(":")?;
            let type_ref = self.parse_type_ref()?;
            params.push(Param { name: name.lexeme, type_ref, span: name.span });
            if self.peek_is_punct(",") {
                self.advance();
                continue;
            }
            break;
        }
        self.expect_punct(")")?;
        Ok(params)
    }

    fn parse_type_params(&mut self) -> Parse<Vec<TypeParam>> {
        let mut params = Vec::new();
        if !self.peek_is_op("<") {
            return Ok(params);
        }
        self.advance();
        loop {
            let ident = self.expect_ident()?;
            let mut bounds = Vec::new();
            if self.peek_is_punct(":") {
                self.advance();
                loop {
                    let bound = self.expect_ident()?;
                    bounds.push(bound.lexeme);
                    if self.peek_is_op("+") {
                        self.advance();
                        continue;
                    }
                    break;
                }
            }
            params.push(TypeParam { name: ident.lexeme, bounds, span: ident.span });
            if self.peek_is_punct(",") {
                self.advance();
                continue;
            }
            if self.peek_is_op(">") {
                self.advance();
                break;
            }
            let tok = self.peek().clone();
            return Err(self.error_at(&tok, "expected ',' or '>' in type parameters"));
        }
        Ok(params)
    }

    fn parse_type_ref(&mut self) -> Parse<TypeRef> {
        let name = self.expect_ident()?;
        let mut args = Vec::new();
        if self.peek_is_op("<") {
            self.advance();
            loop {
                args.push(self.parse_type_ref()?);
                if self.peek_is_punct(",") {
                    self.advance();
                    continue;
                }
                if self.peek_is_op(">") {
                    self.advance();
                    break;
                }
                let tok = self.peek().clone();
                return Err(self.error_at(&tok, "expected ',' or '>' in type arguments"));
            }
        }
        Ok(TypeRef { name: name.lexeme, args, span: name.span })
    }

    fn parse_type_ref_tokens(&self, tokens: &[Token], mut idx: usize) -> Parse<(TypeRef, usize)> {
        let name_tok = tokens.get(idx).ok_or_else(|| self.error_here("expected type name"))?;
        if !matches!(name_tok.kind, TokenKind::Ident | TokenKind::Keyword) {
            return Err(self.error_at(name_tok, "expected type name"));
        }
        idx += 1;
        let mut args = Vec::new();
        if tokens.get(idx).map(|t| t.lexeme.as_str()) == Some("<") {
            idx += 1;
            loop {
                let (arg, next) = self.parse_type_ref_tokens(tokens, idx)?;
                args.push(arg);
                idx = next;
                match tokens.get(idx).map(|t| t.lexeme.as_str()) {
                    Some(",") => idx += 1,
                    Some(">") => {
                        idx += 1;
                        break;
                    }
                    _ => return Err(self.error_at(name_tok, "expected ',' or '>' in type arguments")),
                }
            }
        }
        Ok((TypeRef { name: name_tok.lexeme.clone(), args, span: name_tok.span }, idx))
    }

    // === expression parsing over token slices ===

    fn parse_expr_tokens(&mut self, tokens: &[Token]) -> Parse<Expr> {
        let Some(first) = tokens.first() else {
            return Err(self.error_here("expected expression"));
        };
        if first.is_word("try") || first.is_word("시도") || first.is_word("시도한다") {
            let inner = self.parse_expr_tokens(&tokens[1..])?;
            return Ok(self.expr(ExprKind::Try { value: Box::new(inner) }, span_of(tokens)));
        }
        if first.is_word("borrow") {
            return self.parse_borrow_tokens(tokens);
        }
        if first.is_word("빌려온다") {
            // `빌려온다(가변|불변) EXPR`
            if tokens.len() < 5 {
                return Err(self.error_at(first, "빌려온다 requires a mode and a value"));
            }
            let mutable = tokens[2].is_word("가변");
            let inner = self.parse_expr_tokens(&tokens[4..])?;
            return Ok(self.expr(
                ExprKind::Borrow { value: Box::new(inner), mutable },
                span_of(tokens),
            ));
        }
        if first.is_word("copy") || first.is_word("복사한다") {
            let inner = self.parse_expr_tokens(&tokens[1..])?;
            return Ok(self.expr(ExprKind::Copy { value: Box::new(inner) }, span_of(tokens)));
        }
        if first.is_word("move") {
            let inner = self.parse_expr_tokens(&tokens[1..])?;
            return Ok(self.expr(ExprKind::Move { value: Box::new(inner) }, span_of(tokens)));
        }
        self.parse_logical_or(tokens)
    }

    /// `borrow [mut] EXPR` or `borrow [mut] BUF[A..B]`.
    fn parse_borrow_tokens(&mut self, tokens: &[Token]) -> Parse<Expr> {
        let span = span_of(tokens);
        let mut rest = &tokens[1..];
        let mutable = rest.first().map(|t| t.is_word("mut")).unwrap_or(false);
        if mutable {
            rest = &rest[1..];
        }
        if rest.last().map(|t| t.lexeme.as_str()) == Some("]") {
            if let Some(open) = rest.iter().position(|t| t.lexeme == "[") {
                let buffer = self.parse_expr_tokens(&rest[..open])?;
                let range = &rest[open + 1..rest.len() - 1];
                let dotdot = range
                    .iter()
                    .position(|t| t.kind == TokenKind::DotDot)
                    .ok_or_else(|| self.error_here("expected '..' in borrow range"))?;
                let start = self.parse_expr_tokens(&range[..dotdot])?;
                let end = self.parse_expr_tokens(&range[dotdot + 1..])?;
                return Ok(self.expr(
                    ExprKind::BorrowRange {
                        buffer: Box::new(buffer),
                        start: Box::new(start),
                        end: Box::new(end),
                        mutable,
                    },
                    span,
                ));
            }
        }
        let inner = self.parse_expr_tokens(rest)?;
        return Ok(self.expr(ExprKind::Borrow { value: Box::new(inner), mutable }, span));
    }

    fn parse_logical_or(&mut self, tokens: &[Token]) -> Parse<Expr> {
        if let Some(idx) = find_top_level(tokens, &["or", "||", "또는"], false) {
            let left = self.parse_logical_or(&tokens[..idx])?;
            let right = self.parse_logical_and(&tokens[idx + 1..])?;
            return Ok(self.expr(
                ExprKind::Logical { left: Box::new(left), op: LogicalOp::Or, right: Box::new(right) },
                span_of(tokens),
            ));
        }
        self.parse_logical_and(tokens)
    }

    fn parse_logical_and(&mut self, tokens: &[Token]) -> Parse<Expr> {
        if let Some(idx) = find_top_level(tokens, &["and", "&&", "그리고"], false) {
            let left = self.parse_logical_and(&tokens[..idx])?;
            let right = self.parse_comparison(&tokens[idx + 1..])?;
            return Ok(self.expr(
                ExprKind::Logical { left: Box::new(left), op: LogicalOp::And, right: Box::new(right) },
                span_of(tokens),
            ));
        }
        self.parse_comparison(tokens)
    }

    fn parse_comparison(&mut self, tokens: &[Token]) -> Parse<Expr> {
        if looks_like_generic_call(tokens) {
            return self.parse_add(tokens);
        }
        // `A 보다 크면` / `A 보다 작으면`
        if tokens.iter().any(|t| t.is_word("보다"))
            && tokens
                .last()
                .map(|t| t.is_word("크면") || t.is_word("작으면"))
                .unwrap_or(false)
        {
            if let Some(idx) = find_top_level(tokens, &["보다"], false) {
                let left = self.parse_add(&tokens[..idx])?;
                let right = self.parse_add(&tokens[idx + 1..tokens.len() - 1])?;
                let op = if tokens.last().unwrap().is_word("크면") { BinOp::Gt } else { BinOp::Lt };
                return Ok(self.expr(
                    ExprKind::BinOp { left: Box::new(left), op, right: Box::new(right) },
                    span_of(tokens),
                ));
            }
        }
        if let Some(idx) = find_top_level(tokens, &["==", "!=", ">=", "<=", ">", "<"], false) {
            let left = self.parse_add(&tokens[..idx])?;
            let right = self.parse_add(&tokens[idx + 1..])?;
            let op = match tokens[idx].lexeme.as_str() {
                "==" => BinOp::Eq,
                "!=" => BinOp::Ne,
                ">=" => BinOp::Ge,
                "<=" => BinOp::Le,
                ">" => BinOp::Gt,
                _ => BinOp::Lt,
            };
            return Ok(self.expr(
                ExprKind::BinOp { left: Box::new(left), op, right: Box::new(right) },
                span_of(tokens),
            ));
        }
        self.parse_add(tokens)
    }

    fn parse_add(&mut self, tokens: &[Token]) -> Parse<Expr> {
        if let Some(idx) = find_top_level(tokens, &["+", "-"], true) {
            let left = self.parse_add(&tokens[..idx])?;
            let right = self.parse_mul(&tokens[idx + 1..])?;
            let op = if tokens[idx].lexeme == "+" { BinOp::Add } else { BinOp::Sub };
            return Ok(self.expr(
                ExprKind::BinOp { left: Box::new(left), op, right: Box::new(right) },
                span_of(tokens),
            ));
        }
        self.parse_mul(tokens)
    }

    fn parse_mul(&mut self, tokens: &[Token]) -> Parse<Expr> {
        if let Some(idx) = find_top_level(tokens, &["*", "/"], false) {
            let left = self.parse_mul(&tokens[..idx])?;
            let right = self.parse_unary(&tokens[idx + 1..])?;
            let op = if tokens[idx].lexeme == "*" { BinOp::Mul } else { BinOp::Div };
            return Ok(self.expr(
                ExprKind::BinOp { left: Box::new(left), op, right: Box::new(right) },
                span_of(tokens),
            ));
        }
        self.parse_unary(tokens)
    }

    fn parse_unary(&mut self, tokens: &[Token]) -> Parse<Expr> {
        if let Some(first) = tokens.first() {
            if first.kind == TokenKind::Op && (first.lexeme == "-" || first.lexeme == "+") {
                let value = self.parse_unary(&tokens[1..])?;
                let op = if first.lexeme == "-" { UnOp::Neg } else { UnOp::Plus };
                return Ok(self.expr(ExprKind::UnaryOp { op, value: Box::new(value) }, span_of(tokens)));
            }
        }
        self.parse_primary(tokens)
    }

    fn parse_primary(&mut self, tokens: &[Token]) -> Parse<Expr> {
        let Some(first) = tokens.first() else {
            return Err(self.error_here("expected expression"));
        };
        if is_wrapped(tokens) {
            return self.parse_expr_tokens(&tokens[1..tokens.len() - 1]);
        }
        if tokens.len() == 1 {
            return self.token_to_expr(first);
        }
        if let Some(call) = self.parse_generic_call(tokens)? {
            return Ok(call);
        }
        let span = span_of(tokens);
        if matches!(first.kind, TokenKind::Ident | TokenKind::Keyword)
            && tokens.get(1).map(|t| t.lexeme.as_str()) == Some("(")
            && tokens.last().map(|t| t.lexeme.as_str()) == Some(")")
        {
            let args = self.parse_call_args(&tokens[2..tokens.len() - 1])?;
            return Ok(self.make_call(first.lexeme.clone(), args, span));
        }
        if let Some((name, rest)) = qualified_name(tokens) {
            if rest.first().map(|t| t.lexeme.as_str()) == Some("(")
                && rest.last().map(|t| t.lexeme.as_str()) == Some(")")
            {
                let args = self.parse_call_args(&rest[1..rest.len() - 1])?;
                return Ok(self.make_call(name, args, span));
            }
            if rest.is_empty() {
                return Ok(self.member_access_from_name(&name, tokens));
            }
        }
        self.token_to_expr(first)
    }

    fn make_call(&mut self, callee: String, args: Vec<Expr>, span: Span) -> Expr {
        // `buffer(N)` is region creation, not a runtime call.
        if callee == "buffer" && args.len() == 1 {
            let size = args.into_iter().next().unwrap();
            return self.expr(ExprKind::BufferCreate { size: Box::new(size) }, span);
        }
        self.expr(ExprKind::Call { callee, args }, span)
    }

    /// `name<int, string>(args)` mangles to `name__int__string(args)`.
    fn parse_generic_call(&mut self, tokens: &[Token]) -> Parse<Option<Expr>> {
        if !looks_like_generic_call(tokens) {
            return Ok(None);
        }
        let lt_idx = find_top_level(tokens, &["<"], false).unwrap();
        let name = if lt_idx == 1 {
            tokens[0].lexeme.clone()
        } else {
            match qualified_name(&tokens[..lt_idx]) {
                Some((name, rest)) if rest.is_empty() => name,
                _ => return Ok(None),
            }
        };
        let mut depth = 0i32;
        let mut gt_idx = None;
        for (idx, tok) in tokens.iter().enumerate() {
            match tok.lexeme.as_str() {
                "<" => depth += 1,
                ">" => {
                    depth -= 1;
                    if depth == 0 {
                        gt_idx = Some(idx);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(gt_idx) = gt_idx else { return Ok(None) };
        let mut arg_names = Vec::new();
        let mut idx = lt_idx + 1;
        while idx < gt_idx {
            let (tref, next) = self.parse_type_ref_tokens(tokens, idx)?;
            arg_names.push(mangle_type_ref(&tref));
            idx = next;
            if idx < gt_idx && tokens[idx].lexeme == "," {
                idx += 1;
            }
        }
        if idx != gt_idx || arg_names.is_empty() {
            return Ok(None);
        }
        let callee = format!("{}__{}", name, arg_names.join("__"));
        let args = self.parse_call_args(&tokens[gt_idx + 2..tokens.len() - 1])?;
        let span = span_of(tokens);
        Ok(Some(self.expr(ExprKind::Call { callee, args }, span)))
    }

    fn parse_call_args(&mut self, tokens: &[Token]) -> Parse<Vec<Expr>> {
        let mut args = Vec::new();
        let mut current: Vec<Token> = Vec::new();
        let mut depth = 0i32;
        let mut angle_depth = 0i32;
        for tok in tokens {
            match tok.lexeme.as_str() {
                "(" | "[" => depth += 1,
                ")" | "]" => depth -= 1,
                "<" => angle_depth += 1,
                ">" => angle_depth -= 1,
                _ => {}
            }
            if tok.lexeme == "," && depth == 0 && angle_depth == 0 {
                args.push(self.parse_expr_tokens(&current)?);
                current.clear();
            } else {
                current.push(tok.clone());
            }
        }
        if !current.is_empty() {
            args.push(self.parse_expr_tokens(&current)?);
        }
        Ok(args)
    }

    fn member_access_from_name(&mut self, name: &str, tokens: &[Token]) -> Expr {
        let span = span_of(tokens);
        let mut parts = name.split('.');
        let head = parts.next().unwrap_or_default();
        let mut expr = self.expr(ExprKind::Name(head.to_string()), tokens[0].span);
        for part in parts {
            expr = self.expr(ExprKind::Member { value: Box::new(expr), name: part.to_string() }, span);
        }
        expr
    }

    fn token_to_expr(&mut self, token: &Token) -> Parse<Expr> {
        let span = token.span;
        match &token.kind {
            TokenKind::Int(value) => Ok(self.expr(ExprKind::Int(*value), span)),
            TokenKind::Str(value) => Ok(self.expr(ExprKind::Str(value.clone()), span)),
            TokenKind::Ident | TokenKind::Keyword => match token.lexeme.as_str() {
                "true" | "참" => Ok(self.expr(ExprKind::Bool(true), span)),
                "false" | "거짓" => Ok(self.expr(ExprKind::Bool(false), span)),
                _ => Ok(self.expr(ExprKind::Name(token.lexeme.clone()), span)),
            },
            _ => Err(self.error_at(token, "expected expression")),
        }
    }

    // === stream helpers ===

    fn parse_expr_until_punct(&mut self, stop: &str) -> Parse<Expr> {
        let tokens = self.collect_until(|t| {
            (t.kind == TokenKind::Punct && t.lexeme == stop) || t.kind == TokenKind::Newline
        });
        self.parse_expr_tokens(&tokens)
    }

    fn parse_expr_until_op(&mut self, stop: &str) -> Parse<Expr> {
        let tokens = self.collect_until(|t| {
            (t.kind == TokenKind::Op && t.lexeme == stop) || t.kind == TokenKind::Newline
        });
        self.parse_expr_tokens(&tokens)
    }

    fn parse_expr_until_word(&mut self, stop: &str) -> Parse<Expr> {
        let stop = stop.to_string();
        let tokens =
            self.collect_until(move |t| t.is_word(&stop) || t.kind == TokenKind::Newline);
        self.parse_expr_tokens(&tokens)
    }

    fn parse_expr_until_newline(&mut self) -> Parse<Expr> {
        let tokens = self.collect_until(|t| t.kind == TokenKind::Newline);
        self.parse_expr_tokens(&tokens)
    }

    fn collect_until(&mut self, stop: impl Fn(&Token) -> bool) -> Vec<Token> {
        let mut tokens = Vec::new();
        while !self.peek_kind(&TokenKind::Eof) && !stop(self.peek()) {
            tokens.push(self.advance());
        }
        tokens
    }

    fn consume_line(&mut self) -> Vec<Token> {
        self.collect_until(|t| t.kind == TokenKind::Newline)
    }

    fn line_tokens(&self) -> &[Token] {
        let mut end = self.pos;
        while end < self.tokens.len() && self.tokens[end].kind != TokenKind::Newline {
            end += 1;
        }
        &self.tokens[self.pos..end]
    }

    fn line_contains(&self, words: &[&str]) -> bool {
        let line = self.line_tokens();
        words.iter().all(|w| line.iter().any(|t| t.is_word(w)))
    }

    fn line_has_particles(&self, particles: &[&str]) -> bool {
        let line = self.line_tokens();
        particles.iter().all(|p| line.iter().any(|t| t.is_particle(p)))
    }

    fn line_ends_with_before_colon(&self, word: &str) -> bool {
        let line = self.line_tokens();
        match line.len() {
            0 | 1 => false,
            n => line[n - 1].lexeme == ":" && line[n - 2].is_word(word),
        }
    }

    fn sync_to_stmt_boundary(&mut self) {
        while !self.peek_kind(&TokenKind::Eof) && !self.peek_kind(&TokenKind::Newline) {
            self.advance();
        }
        if self.peek_kind(&TokenKind::Newline) {
            self.advance();
        }
        // skip a block belonging to the broken statement
        if self.peek_kind(&TokenKind::Indent) {
            let mut depth = 0i32;
            while !self.peek_kind(&TokenKind::Eof) {
                match self.peek().kind {
                    TokenKind::Indent => depth += 1,
                    TokenKind::Dedent => {
                        depth -= 1;
                        if depth == 0 {
                            self.advance();
                            break;
                        }
                    }
                    _ => {}
                }
                self.advance();
            }
        }
    }

    fn expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        let id = self.next_id;
        self.next_id += 1;
        Expr { id, kind, span }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn peek_is_punct(&self, lexeme: &str) -> bool {
        let tok = self.peek();
        tok.kind == TokenKind::Punct && tok.lexeme == lexeme
    }

    fn peek_is_op(&self, lexeme: &str) -> bool {
        let tok = self.peek();
        tok.kind == TokenKind::Op && tok.lexeme == lexeme
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn expect_kind(&mut self, kind: TokenKind) -> Parse<Token> {
        let tok = self.advance();
        if tok.kind != kind {
            return Err(self.error_at(&tok, &format!("expected {kind:?}, found '{}'", tok.lexeme)));
        }
        Ok(tok)
    }

    fn expect_punct(&mut self, lexeme: &str) -> Parse<Token> {
        let tok = self.advance();
        if tok.kind != TokenKind::Punct || tok.lexeme != lexeme {
            return Err(self.error_at(&tok, &format!("expected '{lexeme}', found '{}'", tok.lexeme)));
        }
        Ok(tok)
    }

    fn expect_op(&mut self, lexeme: &str) -> Parse<Token> {
        let tok = self.advance();
        if tok.kind != TokenKind::Op || tok.lexeme != lexeme {
            return Err(self.error_at(&tok, &format!("expected '{lexeme}', found '{}'", tok.lexeme)));
        }
        Ok(tok)
    }

    fn expect_ident(&mut self) -> Parse<Token> {
        let tok = self.advance();
        if !matches!(tok.kind, TokenKind::Ident | TokenKind::Keyword) {
            return Err(self.error_at(&tok, "expected identifier"));
        }
        Ok(tok)
    }

    fn skip_newlines(&mut self) {
        while self.peek_kind(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn error_at(&self, tok: &Token, message: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::SyntaxError, message, Some(tok.span))
    }

    fn error_here(&self, message: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::SyntaxError, message, Some(self.peek().span))
    }

    // === patterns ===

    fn parse_pattern_tokens(&mut self, tokens: &[Token]) -> Parse<Pattern> {
        let Some(first) = tokens.first() else {
            return Ok(Pattern::Wildcard { span: self.peek().span });
        };
        let span = span_of(tokens);
        if tokens.len() == 1 && first.lexeme == "_" {
            return Ok(Pattern::Wildcard { span });
        }
        if tokens.len() == 1
            && matches!(first.kind, TokenKind::Ident)
            && !matches!(first.lexeme.as_str(), "true" | "false" | "참" | "거짓")
        {
            return Ok(Pattern::Bind { name: first.lexeme.clone(), span });
        }
        if matches!(first.kind, TokenKind::Ident | TokenKind::Keyword)
            && tokens.len() >= 3
            && tokens[1].lexeme == "("
            && tokens.last().map(|t| t.lexeme.as_str()) == Some(")")
        {
            let fields = self.parse_pattern_args(&tokens[2..tokens.len() - 1])?;
            return Ok(Pattern::Struct { name: first.lexeme.clone(), fields, span });
        }
        if let Some((name, rest)) = qualified_name(tokens) {
            if let Some((enum_name, case_name)) = name.split_once('.') {
                if rest.first().map(|t| t.lexeme.as_str()) == Some("(")
                    && rest.last().map(|t| t.lexeme.as_str()) == Some(")")
                {
                    let inner = &rest[1..rest.len() - 1];
                    if inner.is_empty() {
                        return Ok(Pattern::EnumVariant {
                            enum_name: enum_name.into(),
                            case_name: case_name.into(),
                            payload: None,
                            binding: None,
                            span,
                        });
                    }
                    if inner.len() == 1 && matches!(inner[0].kind, TokenKind::Ident) {
                        return Ok(Pattern::EnumVariant {
                            enum_name: enum_name.into(),
                            case_name: case_name.into(),
                            payload: None,
                            binding: Some(inner[0].lexeme.clone()),
                            span,
                        });
                    }
                    let payload = self.parse_pattern_tokens(inner)?;
                    return Ok(Pattern::EnumVariant {
                        enum_name: enum_name.into(),
                        case_name: case_name.into(),
                        payload: Some(Box::new(payload)),
                        binding: None,
                        span,
                    });
                }
                if rest.is_empty() {
                    return Ok(Pattern::EnumVariant {
                        enum_name: enum_name.into(),
                        case_name: case_name.into(),
                        payload: None,
                        binding: None,
                        span,
                    });
                }
            }
            if rest.first().map(|t| t.lexeme.as_str()) == Some("(")
                && rest.last().map(|t| t.lexeme.as_str()) == Some(")")
            {
                let fields = self.parse_pattern_args(&rest[1..rest.len() - 1])?;
                return Ok(Pattern::Struct { name, fields, span });
            }
        }
        let value = self.parse_expr_tokens(tokens)?;
        Ok(Pattern::Literal { value })
    }

    fn parse_pattern_args(&mut self, tokens: &[Token]) -> Parse<Vec<Pattern>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = Vec::new();
        let mut current: Vec<Token> = Vec::new();
        let mut depth = 0i32;
        for tok in tokens {
            match tok.lexeme.as_str() {
                "(" => depth += 1,
                ")" => depth -= 1,
                _ => {}
            }
            if tok.lexeme == "," && depth == 0 {
                if !current.is_empty() {
                    args.push(self.parse_pattern_tokens(&current)?);
                }
                current.clear();
            } else {
                current.push(tok.clone());
            }
        }
        if !current.is_empty() {
            args.push(self.parse_pattern_tokens(&current)?);
        }
        Ok(args)
    }
}

// === free helpers over token slices ===

fn span_of(tokens: &[Token]) -> Span {
    match tokens {
        [] => Span::dummy(),
        [first, .., last] => first.span.merge(last.span),
        [only] => only.span,
    }
}

/// Right-to-left scan for the lowest-precedence operator at depth 0.
fn find_top_level(tokens: &[Token], values: &[&str], skip_unary: bool) -> Option<usize> {
    let mut depth = 0i32;
    for idx in (0..tokens.len()).rev() {
        let tok = &tokens[idx];
        match tok.lexeme.as_str() {
            ")" | "]" => {
                depth += 1;
                continue;
            }
            "(" | "[" => {
                depth -= 1;
                continue;
            }
            _ => {}
        }
        if depth != 0 {
            continue;
        }
        let matches_value = match tok.kind {
            TokenKind::Op | TokenKind::DotDot => values.contains(&tok.lexeme.as_str()),
            TokenKind::Ident | TokenKind::Keyword => values.contains(&tok.lexeme.as_str()),
            _ => false,
        };
        if !matches_value {
            continue;
        }
        if skip_unary && (tok.lexeme == "+" || tok.lexeme == "-") {
            let prev = idx.checked_sub(1).map(|i| &tokens[i]);
            let unary = match prev {
                None => true,
                Some(p) => p.lexeme == "(" || p.lexeme == "," || p.kind == TokenKind::Op,
            };
            if unary {
                continue;
            }
        }
        return Some(idx);
    }
    None
}

fn is_wrapped(tokens: &[Token]) -> bool {
    if tokens.first().map(|t| t.lexeme.as_str()) != Some("(")
        || tokens.last().map(|t| t.lexeme.as_str()) != Some(")")
    {
        return false;
    }
    let mut depth = 0i32;
    for (idx, tok) in tokens.iter().enumerate() {
        match tok.lexeme.as_str() {
            "(" => depth += 1,
            ")" => {
                depth -= 1;
                if depth == 0 && idx != tokens.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// `a.b.c` prefix of a token slice, plus whatever follows.
fn qualified_name(tokens: &[Token]) -> Option<(String, &[Token])> {
    let first = tokens.first()?;
    if !matches!(first.kind, TokenKind::Ident | TokenKind::Keyword) {
        return None;
    }
    let mut parts = vec![first.lexeme.clone()];
    let mut idx = 1;
    while idx + 1 < tokens.len()
        && tokens[idx].lexeme == "."
        && matches!(tokens[idx + 1].kind, TokenKind::Ident | TokenKind::Keyword)
    {
        parts.push(tokens[idx + 1].lexeme.clone());
        idx += 2;
    }
    if parts.len() == 1 {
        return None;
    }
    Some((parts.join("."), &tokens[idx..]))
}

fn looks_like_generic_call(tokens: &[Token]) -> bool {
    if tokens.len() < 5 {
        return false;
    }
    let Some(lt_idx) = find_top_level(tokens, &["<"], false) else {
        return false;
    };
    let name_tokens = &tokens[..lt_idx];
    if name_tokens.is_empty() {
        return false;
    }
    if name_tokens.len() == 1 {
        if !matches!(name_tokens[0].kind, TokenKind::Ident | TokenKind::Keyword) {
            return false;
        }
    } else {
        match qualified_name(name_tokens) {
            Some((_, rest)) if rest.is_empty() => {}
            _ => return false,
        }
    }
    let mut depth = 0i32;
    let mut gt_idx = None;
    for (idx, tok) in tokens.iter().enumerate() {
        match tok.lexeme.as_str() {
            "<" => depth += 1,
            ">" => {
                depth -= 1;
                if depth == 0 {
                    gt_idx = Some(idx);
                    break;
                }
            }
            _ => {}
        }
    }
    match gt_idx {
        Some(idx) => {
            idx + 1 < tokens.len()
                && tokens[idx + 1].lexeme == "("
                && tokens.last().map(|t| t.lexeme.as_str()) == Some(")")
        }
        None => false,
    }
}

pub fn mangle_type_ref(tref: &TypeRef) -> String {
    let name = tref.name.replace('.', "__");
    if tref.args.is_empty() {
        return name;
    }
    let suffix = tref.args.iter().map(mangle_type_ref).collect::<Vec<_>>().join("__");
    format!("{name}__{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceFile;

    fn parse_ok(src: &str) -> Module {
        let sf = SourceFile::new(0, "test.dsy".into(), src);
        parse(&sf).expect("parse failed")
    }

    fn parse_err(src: &str) -> Vec<Diagnostic> {
        let sf = SourceFile::new(0, "test.dsy".into(), src);
        match parse(&sf) {
            Err(DaisyError::Diagnostics(diags)) => diags,
            other => panic!("expected diagnostics, got {other:?}"),
        }
    }

    #[test]
    fn english_hello() {
        let module = parse_ok("module hello\nfn main() -> int:\n  print \"hi\"\n  return 0\n");
        assert_eq!(module.name, "hello");
        let Stmt::Func(f) = &module.body[0] else { panic!("expected function") };
        assert_eq!(f.name, "main");
        assert_eq!(f.body.len(), 2);
        assert!(matches!(f.body[0], Stmt::Print { .. }));
        assert!(matches!(f.body[1], Stmt::Return { value: Some(_), .. }));
    }

    #[test]
    fn korean_hello_same_shape() {
        let module = parse_ok("모듈 hello\n함수 main 정의:\n  \"hi\"를 출력한다\n  0을 반환한다\n");
        let Stmt::Func(f) = &module.body[0] else { panic!("expected function") };
        assert_eq!(f.name, "main");
        assert!(matches!(f.body[0], Stmt::Print { .. }));
        assert!(matches!(f.body[1], Stmt::Return { value: Some(_), .. }));
    }

    #[test]
    fn let_and_korean_set_match() {
        let en = parse_ok("module m\nfn main() -> int:\n  let x = 1 + 2\n  return x\n");
        let ko = parse_ok("모듈 m\n함수 main 정의:\n  x를 1 + 2로 설정한다\n  x를 반환한다\n");
        let Stmt::Func(fe) = &en.body[0] else { panic!() };
        let Stmt::Func(fk) = &ko.body[0] else { panic!() };
        let (Stmt::Let { name: ne, init: ie, .. }, Stmt::Let { name: nk, init: ik, .. }) =
            (&fe.body[0], &fk.body[0])
        else {
            panic!("expected lets")
        };
        assert_eq!(ne, nk);
        assert!(matches!(ie.kind, ExprKind::BinOp { op: BinOp::Add, .. }));
        assert!(matches!(ik.kind, ExprKind::BinOp { op: BinOp::Add, .. }));
    }

    #[test]
    fn buffer_create_both_surfaces() {
        let en = parse_ok("module m\nfn main() -> int:\n  let b = buffer(8)\n  return 0\n");
        let ko = parse_ok("모듈 m\n함수 main 정의:\n  b를 8바이트로 생성한다\n  0을 반환한다\n");
        for module in [en, ko] {
            let Stmt::Func(f) = &module.body[0] else { panic!() };
            let Stmt::Let { name, init, .. } = &f.body[0] else { panic!("expected let") };
            assert_eq!(name, "b");
            assert!(matches!(init.kind, ExprKind::BufferCreate { .. }));
        }
    }

    #[test]
    fn borrow_range_both_surfaces() {
        let en = parse_ok("module m\nfn main() -> int:\n  let r = buffer(8)\n  let v = borrow mut r[0..8]\n  return 0\n");
        let ko = parse_ok(
            "모듈 m\n함수 main 정의:\n  r를 8바이트로 생성한다\n  v를 r의 0부터 8까지로 빌려온다(가변)\n  0을 반환한다\n",
        );
        for module in [en, ko] {
            let Stmt::Func(f) = &module.body[0] else { panic!() };
            let Stmt::Let { init, .. } = &f.body[1] else { panic!("expected let") };
            let ExprKind::BorrowRange { mutable, .. } = &init.kind else {
                panic!("expected borrow range")
            };
            assert!(mutable);
        }
    }

    #[test]
    fn move_both_surfaces() {
        let en = parse_ok("module m\nfn main() -> int:\n  let a = buffer(8)\n  let b = move a\n  return 0\n");
        let ko = parse_ok("모듈 m\n함수 main 정의:\n  a를 8바이트로 생성한다\n  a를 b로 이동한다\n  0을 반환한다\n");
        for module in [en, ko] {
            let Stmt::Func(f) = &module.body[0] else { panic!() };
            let Stmt::Let { name, init, .. } = &f.body[1] else { panic!("expected let") };
            assert_eq!(name, "b");
            assert!(matches!(init.kind, ExprKind::Move { .. }));
        }
    }

    #[test]
    fn try_expression_both_surfaces() {
        let en = parse_ok("module m\nfn f() -> Result<int, int>:\n  let x = try inner()\n  return Result.Ok(x)\n");
        let Stmt::Func(f) = &en.body[0] else { panic!() };
        let Stmt::Let { init, .. } = &f.body[0] else { panic!() };
        assert!(matches!(init.kind, ExprKind::Try { .. }));
        let ko = parse_ok("모듈 m\n함수 main 정의:\n  x를 시도 inner()로 설정한다\n  0을 반환한다\n");
        let Stmt::Func(f) = &ko.body[0] else { panic!() };
        let Stmt::Let { init, .. } = &f.body[0] else { panic!() };
        assert!(matches!(init.kind, ExprKind::Try { .. }));
    }

    #[test]
    fn generics_and_bounds() {
        let module = parse_ok(
            "module m\nfn id<T: Printable>(x: T) -> T:\n  return x\nfn main() -> int:\n  let y = id<int>(3)\n  return y\n",
        );
        let Stmt::Func(f) = &module.body[0] else { panic!() };
        assert_eq!(f.type_params.len(), 1);
        assert_eq!(f.type_params[0].bounds, vec!["Printable".to_string()]);
        let Stmt::Func(main) = &module.body[1] else { panic!() };
        let Stmt::Let { init, .. } = &main.body[0] else { panic!() };
        let ExprKind::Call { callee, .. } = &init.kind else { panic!("expected call") };
        assert_eq!(callee, "id__int");
    }

    #[test]
    fn match_with_guard_and_else() {
        let module = parse_ok(
            "module m\nenum Shape:\n  case Dot\n  case Line: int\nfn f(s: Shape) -> int:\n  match s:\n    case Shape.Line(n) if n > 2:\n      return n\n    case Shape.Dot:\n      return 0\n    else:\n      return 1\n  return 9\n",
        );
        let Stmt::Func(f) = &module.body[1] else { panic!() };
        let Stmt::Match { arms, else_body, .. } = &f.body[0] else { panic!("expected match") };
        assert_eq!(arms.len(), 2);
        assert!(arms[0].guard.is_some());
        assert!(else_body.is_some());
        assert!(matches!(
            arms[0].pattern,
            Pattern::EnumVariant { binding: Some(_), .. }
        ));
    }

    #[test]
    fn unsafe_requires_reason() {
        let diags = parse_err("module m\nfn main() -> int:\n  unsafe:\n    return 0\n  return 0\n");
        assert!(diags
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnsafeWithoutJustification));
    }

    #[test]
    fn repeat_without_count_is_rejected() {
        let diags = parse_err("module m\nfn main() -> int:\n  repeat:\n    print 1\n  return 0\n");
        assert!(diags.iter().any(|d| d.kind == DiagnosticKind::SyntaxError));
    }

    #[test]
    fn parser_recovers_at_statement_boundaries() {
        let diags = parse_err("module m\nfn main() -> int:\n  let = 3\n  let y = (\n  return 0\n");
        assert!(diags.len() >= 2, "expected several diagnostics, got {diags:?}");
    }

    #[test]
    fn surface_directive_locks_line() {
        let module = parse_ok("module m\nfn main() -> int:\n  영어: print 1\n  return 0\n");
        let Stmt::Func(f) = &module.body[0] else { panic!() };
        assert!(matches!(f.body[0], Stmt::Print { .. }));
    }

    #[test]
    fn imports_and_aliases() {
        let module = parse_ok("module m\nimport util as u\nuse helpers\n모듈을 \"extra\" 별칭 x로 가져온다\nfn main() -> int:\n  return 0\n");
        let Stmt::Import(i) = &module.body[0] else { panic!() };
        assert_eq!(i.module, "util");
        assert_eq!(i.alias.as_deref(), Some("u"));
        assert!(!i.is_use);
        let Stmt::Import(u) = &module.body[1] else { panic!() };
        assert!(u.is_use);
        let Stmt::Import(k) = &module.body[2] else { panic!() };
        assert_eq!(k.module, "extra");
        assert_eq!(k.alias.as_deref(), Some("x"));
    }

    #[test]
    fn trait_and_impl() {
        let module = parse_ok(
            "module m\ntrait Printable:\n  fn describe(x: int) -> string\nstruct Point:\n  x: int\n  y: int\nimpl Printable for Point:\n  fn describe(self: Point) -> string:\n    return \"point\"\nfn main() -> int:\n  return 0\n",
        );
        let Stmt::Trait(t) = &module.body[0] else { panic!() };
        assert_eq!(t.methods.len(), 1);
        let Stmt::Impl(i) = &module.body[2] else { panic!() };
        assert_eq!(i.trait_name.as_deref(), Some("Printable"));
        assert_eq!(i.for_type.name, "Point");
        assert_eq!(i.methods.len(), 1);
    }

    #[test]
    fn short_circuit_is_logical_op() {
        let module = parse_ok("module m\nfn f(a: bool, b: bool) -> bool:\n  return a and b or true\n");
        let Stmt::Func(f) = &module.body[0] else { panic!() };
        let Stmt::Return { value: Some(v), .. } = &f.body[0] else { panic!() };
        assert!(matches!(
            v.kind,
            ExprKind::Logical { op: LogicalOp::Or, .. }
        ));
    }
}
