use splc::compile;
use splc::error::CompileError;

#[test]
fn compiles_a_minimal_module() {
    let asm = compile("module t; var x: integer; begin x := 2 + 3 * 4 end t.").unwrap();
    assert!(asm.starts_with("# module t"));
    assert!(asm.contains("\t.global main"));
    assert!(asm.contains("\nmain:"));
    assert!(asm.contains("imull"));
    assert!(asm.contains("x:\t.skip 4"));
    assert!(asm.trim_end().ends_with(".end"));
}

#[test]
fn subroutines_are_emitted_before_main() {
    let asm = compile(
        "module t; var x: integer; \
         function double(n: integer): integer; begin return n + n end double; \
         begin x := double(21) end t.",
    )
    .unwrap();
    let double_at = asm.find("\ndouble:").unwrap();
    let main_at = asm.find("\nmain:").unwrap();
    assert!(double_at < main_at);
    assert!(asm.contains("call\tdouble"));
    assert!(asm.contains("l_double_exit:"));
}

#[test]
fn short_circuit_evaluation_skips_the_second_operand() {
    let asm = compile(
        "module t; var x: integer; b: boolean; \
         function touch(): boolean; begin x := x + 1; return true end touch; \
         begin b := false && touch() end t.",
    )
    .unwrap();
    // The first operand is a constant false: the lowering jumps straight to
    // the false label, so the call lands after the unconditional jump.
    let jmp_at = asm.find("main:").map(|i| asm[i..].find("jmp").unwrap() + i).unwrap();
    let call_at = asm.rfind("call\ttouch").unwrap();
    assert!(jmp_at < call_at);
}

#[test]
fn runtime_calls_are_declared_extern() {
    let asm = compile(
        "module echo; var v: integer; \
         begin v := ReadInt(); WriteInt(v); WriteLn() end echo.",
    )
    .unwrap();
    for name in ["ReadInt", "WriteInt", "WriteLn", "DIM", "DOFS"] {
        assert!(asm.contains(&format!(".extern {}", name)), "missing {}", name);
    }
    assert!(asm.contains("call\tReadInt"));
    // WriteLn takes no arguments: no stack cleanup after the call.
    let at = asm.find("call\tWriteLn").unwrap();
    let next_line = asm[at..].lines().nth(1).unwrap();
    assert!(!next_line.contains("addl"));
}

#[test]
fn string_arguments_reach_writestr_by_address() {
    let asm = compile("module t; begin WriteStr(\"hello\\n\") end t.").unwrap();
    assert!(asm.contains("leal\t_str_1, %eax"));
    assert!(asm.contains(".asciz \"hello\\n\""));
    assert!(asm.contains("call\tWriteStr"));
}

#[test]
fn diagnostics_carry_line_and_column() {
    let err = compile("module t;\nvar x: integer;\nbegin\n  y := 1\nend t.").unwrap_err();
    assert_eq!(err.to_string(), "4:3: undeclared identifier 'y'");
    assert!(matches!(err, CompileError::Semantic { .. }));

    let err = compile("module t; var x: integer; begin x := $1 end t.").unwrap_err();
    assert!(matches!(err, CompileError::Lexical { .. }));

    let err = compile("module t; begin end").unwrap_err();
    assert!(matches!(err, CompileError::Syntax { .. }));
}

#[test]
fn type_errors_stop_before_code_generation() {
    let err = compile("module t; var b: boolean; begin b := 1 + true end t.").unwrap_err();
    assert!(matches!(err, CompileError::Semantic { .. }));
    assert!(err.to_string().contains("arithmetic operation"));
}

#[test]
fn nested_control_flow_round_trips() {
    let asm = compile(
        "module gcd; var a, b, t: integer; \
         begin \
           a := ReadInt(); b := ReadInt(); \
           while (b # 0) do t := b; b := a - b * (a / b); a := t end; \
           WriteInt(a); WriteLn() \
         end gcd.",
    )
    .unwrap();
    assert!(asm.contains("jne\tl_gcd_"));
    assert!(asm.contains("cdq"));
    assert!(asm.contains("idivl"));
}

#[test]
fn array_parameters_decay_and_index_through_the_runtime() {
    let asm = compile(
        "module t; var data: integer[10]; \
         procedure fill(v: integer[]); var i: integer; \
         begin i := 0; while (i < DIM(v, 1)) do v[i] := i; i := i + 1 end end fill; \
         begin fill(data) end t.",
    )
    .unwrap();
    assert!(asm.contains("call\tDIM"));
    // The caller passes the address of the array header.
    assert!(asm.contains("leal\tdata, %eax"));
    assert!(asm.contains("data:\t.long 1"));
    assert!(asm.contains("\t.long 10"));
}

#[test]
fn concrete_array_parameters_are_passed_by_reference() {
    let asm = compile(
        "module t; var a: integer[5]; \
         procedure p(v: integer[5]); begin v[0] := 7 end p; \
         begin p(a) end t.",
    )
    .unwrap();
    // The callee loads the pointer argument and indexes the caller's array;
    // it never takes the address of its own argument slot.
    assert!(asm.contains("movl\t8(%ebp), %eax"));
    assert!(!asm.contains("leal\t8(%ebp)"));
    // The caller pushes the header address.
    assert!(asm.contains("leal\ta, %eax"));
}

#[test]
fn subarray_arguments_pass_the_row_address() {
    let asm = compile(
        "module t; var m: integer[3][4]; x: integer; \
         function sum(v: integer[]): integer; begin return v[0] end sum; \
         begin x := sum(m[1]) end t.",
    )
    .unwrap();
    let main_at = asm.find("\nmain:").unwrap();
    let call_at = asm[main_at..].find("call\tsum").unwrap() + main_at;
    let before_call = &asm[main_at..call_at];
    // The argument is the computed row address, pushed as-is; nothing is
    // loaded through it before the call.
    assert!(before_call.contains("leal\tm, %eax"));
    assert!(!before_call.contains("(%edi)"));
}

#[test]
fn compilation_is_deterministic() {
    let src = "module t; var m: integer[3][4]; x: integer; \
               begin m[1][2] := 7; x := m[1][2] end t.";
    assert_eq!(compile(src).unwrap(), compile(src).unwrap());
}
