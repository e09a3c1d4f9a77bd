use calico::lexer::{lex, Literal, TokenKind};
use pretty_assertions::assert_eq;

fn kinds(source: &str) -> Vec<TokenKind> {
    lex("<test>", source).into_iter().map(|t| t.kind).collect()
}

#[test]
fn keywords_and_identifiers() {
    use TokenKind::*;
    assert_eq!(
        kinds("if elsif else end while for in do def class module"),
        vec![If, Elsif, Else, End, While, For, In, Do, Def, Class, Module]
    );
    assert_eq!(kinds("iffy formal classic"), vec![Ident, Ident, Ident]);
}

#[test]
fn variables_carry_their_sigil() {
    let tokens = lex("<test>", "@count = @count + 1");
    assert_eq!(tokens[0].kind, TokenKind::Variable);
    assert_eq!(tokens[0].text, "@count");
    assert_eq!(tokens[0].var_name(), "count");
}

#[test]
fn int_literals_allow_underscores() {
    let tokens = lex("<test>", "1_000_000");
    assert_eq!(tokens[0].kind, TokenKind::IntLit);
    assert_eq!(tokens[0].literal, Some(Literal::Int(1_000_000)));
}

#[test]
fn float_literal_needs_digits_on_both_sides() {
    let tokens = lex("<test>", "3.14");
    assert_eq!(tokens[0].kind, TokenKind::FloatLit);
    assert_eq!(tokens[0].literal, Some(Literal::Float(3.14)));
}

#[test]
fn range_is_not_a_float() {
    use TokenKind::*;
    assert_eq!(kinds("[1..5]"), vec![LBracket, IntLit, DotDot, IntLit, RBracket]);
}

#[test]
fn string_literal_keeps_escapes_and_interpolation_verbatim() {
    let tokens = lex("<test>", r#""line\n${1 + 2}""#);
    assert_eq!(tokens[0].kind, TokenKind::StringLit);
    assert_eq!(
        tokens[0].literal,
        Some(Literal::Str(r"line\n${1 + 2}".to_string()))
    );
}

#[test]
fn comments_are_skipped() {
    use TokenKind::*;
    let source = "@a = 1 // trailing\n/* block\n comment */ @b = 2";
    assert_eq!(kinds(source), vec![Variable, Eq, IntLit, Variable, Eq, IntLit]);
}

#[test]
fn compound_operators_win_over_single() {
    use TokenKind::*;
    assert_eq!(
        kinds("== != <= >= && || << >> ::"),
        vec![EqEq, Ne, Le, Ge, AmpAmp, PipePipe, Shl, Shr, ColonColon]
    );
}

#[test]
fn unrecognized_characters_become_unknown_tokens() {
    let tokens = lex("<test>", "@a = #");
    assert_eq!(tokens[2].kind, TokenKind::Unknown);
    assert_eq!(tokens[2].text, "#");
}

#[test]
fn positions_are_one_based() {
    let tokens = lex("<test>", "@a = 1\n@b = 2");
    assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
    let b = &tokens[3];
    assert_eq!(b.text, "@b");
    assert_eq!((b.line, b.column), (2, 1));
}

#[test]
fn overflowing_int_literal_is_unknown() {
    let tokens = lex("<test>", "99999999999999999999999");
    assert_eq!(tokens[0].kind, TokenKind::Unknown);
}
