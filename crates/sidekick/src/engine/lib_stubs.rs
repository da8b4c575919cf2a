//
// engine/lib_stubs.rs
//
// Compact standard-library declarations bundled with the symbol-index engine
//

use std::collections::BTreeMap;

use crate::config::LibTarget;

const LIB_ES5: &str = r#"/// <reference no-default-lib="true"/>
declare var NaN: number;
declare var Infinity: number;
/** Converts a string to an integer. */
declare function parseInt(string: string, radix?: number): number;
/** Converts a string to a floating-point number. */
declare function parseFloat(string: string): number;
declare function isNaN(number: number): boolean;
declare function isFinite(number: number): boolean;
declare function encodeURIComponent(uriComponent: string | number | boolean): string;
declare function decodeURIComponent(encodedURIComponent: string): string;

interface Object {
    toString(): string;
    hasOwnProperty(v: PropertyKey): boolean;
}
declare var Object: ObjectConstructor;
interface ObjectConstructor {
    keys(o: object): string[];
    values(o: object): any[];
    entries(o: object): [string, any][];
    assign(target: object, ...sources: any[]): any;
    freeze<T>(o: T): Readonly<T>;
}

interface String {
    length: number;
    charAt(pos: number): string;
    indexOf(searchString: string, position?: number): number;
    slice(start?: number, end?: number): string;
    split(separator: string | RegExp, limit?: number): string[];
    toLowerCase(): string;
    toUpperCase(): string;
    trim(): string;
    replace(searchValue: string | RegExp, replaceValue: string): string;
}
declare var String: StringConstructor;
interface StringConstructor {
    fromCharCode(...codes: number[]): string;
}

interface Number {
    toFixed(fractionDigits?: number): string;
    toString(radix?: number): string;
}
declare var Number: NumberConstructor;
interface NumberConstructor {
    isInteger(number: unknown): boolean;
    parseFloat(string: string): number;
}

interface Boolean {}
declare var Boolean: BooleanConstructor;
interface BooleanConstructor {}

interface Array<T> {
    length: number;
    push(...items: T[]): number;
    pop(): T | undefined;
    map<U>(callbackfn: (value: T, index: number) => U): U[];
    filter(predicate: (value: T, index: number) => unknown): T[];
    reduce<U>(callbackfn: (previous: U, current: T) => U, initialValue: U): U;
    forEach(callbackfn: (value: T, index: number) => void): void;
    join(separator?: string): string;
    slice(start?: number, end?: number): T[];
    indexOf(searchElement: T): number;
}
declare var Array: ArrayConstructor;
interface ArrayConstructor {
    isArray(arg: any): arg is any[];
}

/** An intrinsic object that provides basic mathematics functionality and constants. */
interface Math {
    readonly PI: number;
    abs(x: number): number;
    ceil(x: number): number;
    floor(x: number): number;
    round(x: number): number;
    max(...values: number[]): number;
    min(...values: number[]): number;
    random(): number;
}
declare var Math: Math;

/** An intrinsic object that provides functions to convert JavaScript values to and from the JSON format. */
interface JSON {
    parse(text: string): any;
    stringify(value: any, replacer?: any, space?: string | number): string;
}
declare var JSON: JSON;

interface Date {
    getTime(): number;
    toISOString(): string;
}
declare var Date: DateConstructor;
interface DateConstructor {
    now(): number;
}

interface RegExp {
    test(string: string): boolean;
}
declare var RegExp: RegExpConstructor;
interface RegExpConstructor {}

interface Error {
    name: string;
    message: string;
}
declare var Error: ErrorConstructor;
interface ErrorConstructor {}

type PropertyKey = string | number | symbol;
type Partial<T> = { [P in keyof T]?: T[P] };
type Readonly<T> = { readonly [P in keyof T]: T[P] };
type Record<K extends keyof any, T> = { [P in K]: T };
"#;

const LIB_ES2015: &str = r#"/// <reference lib="es5" />
interface Promise<T> {
    then<R>(onfulfilled?: (value: T) => R): Promise<R>;
    catch<R>(onrejected?: (reason: any) => R): Promise<T | R>;
}
declare var Promise: PromiseConstructor;
interface PromiseConstructor {
    resolve<T>(value: T): Promise<T>;
    reject<T = never>(reason?: any): Promise<T>;
    all<T>(values: Iterable<T>): Promise<T[]>;
}
interface Map<K, V> {
    get(key: K): V | undefined;
    set(key: K, value: V): this;
    has(key: K): boolean;
    delete(key: K): boolean;
    readonly size: number;
}
declare var Map: MapConstructor;
interface MapConstructor {}
interface Set<T> {
    add(value: T): this;
    has(value: T): boolean;
    readonly size: number;
}
declare var Set: SetConstructor;
interface SetConstructor {}
interface Iterable<T> {}
declare var Symbol: SymbolConstructor;
interface SymbolConstructor {
    readonly iterator: symbol;
}
"#;

const LIB_ES2020: &str = r#"/// <reference lib="es2015" />
interface BigInt {
    toString(radix?: number): string;
}
declare var BigInt: BigIntConstructor;
interface BigIntConstructor {}
declare var globalThis: typeof globalThis;
"#;

const LIB_ES2022: &str = r#"/// <reference lib="es2020" />
interface Array<T> {
    at(index: number): T | undefined;
}
interface ObjectConstructor {
    hasOwn(o: object, v: PropertyKey): boolean;
}
declare function structuredClone<T>(value: T): T;
"#;

const LIB_ESNEXT: &str = r#"/// <reference lib="es2022" />
interface Array<T> {
    toSorted(compareFn?: (a: T, b: T) => number): T[];
}
"#;

const LIB_DECORATORS: &str = r#"type ClassDecorator = <TFunction extends Function>(target: TFunction) => TFunction | void;
"#;

const LIB_DOM: &str = r#"/// <reference no-default-lib="true"/>
interface Document {
    title: string;
    getElementById(elementId: string): HTMLElement | null;
}
declare var document: Document;
interface HTMLElement {
    innerText: string;
}
interface Window {
    readonly document: Document;
}
declare var window: Window;
declare function alert(message?: any): void;
declare function fetch(input: string): Promise<any>;
"#;

const LIB_DOM_ITERABLE: &str = r#"interface NodeList {}
"#;

const LIB_WEBWORKER: &str = r#"/// <reference no-default-lib="true"/>
declare function postMessage(message: any): void;
declare function importScripts(...urls: string[]): void;
declare var self: WorkerGlobalScope;
interface WorkerGlobalScope {}
"#;

const LIB_WEBWORKER_IMPORTSCRIPTS: &str = r#"declare function importScripts(...urls: string[]): void;
"#;

const LIB_SCRIPTHOST: &str = r#"declare var ActiveXObject: any;
"#;

/// Full file set for `target`, keyed by virtual path.
///
/// Mirrors the shape of a real compiler distribution: the root lib of each
/// target plus host libraries (`dom`, `webworker`, `scripthost`) and a
/// `.full.d.ts` aggregate that pulls the host libraries in.
pub fn lib_files(target: LibTarget) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    let mut add = |name: &str, content: &str| {
        files.insert(format!("/{name}"), content.to_string());
    };

    add("lib.d.ts", "/// <reference lib=\"es5\" />\n/// <reference lib=\"dom\" />\n");
    add("lib.es5.d.ts", LIB_ES5);
    add("lib.es2015.d.ts", LIB_ES2015);
    add("lib.es2020.d.ts", LIB_ES2020);
    add("lib.decorators.d.ts", LIB_DECORATORS);
    add("lib.dom.d.ts", LIB_DOM);
    add("lib.dom.iterable.d.ts", LIB_DOM_ITERABLE);
    add("lib.webworker.d.ts", LIB_WEBWORKER);
    add("lib.webworker.importscripts.d.ts", LIB_WEBWORKER_IMPORTSCRIPTS);
    add("lib.scripthost.d.ts", LIB_SCRIPTHOST);

    match target {
        LibTarget::Es2020 => {
            add("lib.es2020.full.d.ts", "/// <reference lib=\"es2020\" />\n/// <reference lib=\"dom\" />\n");
        }
        LibTarget::Es2022 => {
            add("lib.es2022.d.ts", LIB_ES2022);
            add("lib.es2022.full.d.ts", "/// <reference lib=\"es2022\" />\n/// <reference lib=\"dom\" />\n");
        }
        LibTarget::EsNext => {
            add("lib.es2022.d.ts", LIB_ES2022);
            add("lib.esnext.d.ts", LIB_ESNEXT);
            add("lib.esnext.full.d.ts", "/// <reference lib=\"esnext\" />\n/// <reference lib=\"dom\" />\n");
        }
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_target_includes_its_root_lib() {
        for target in [LibTarget::Es2020, LibTarget::Es2022, LibTarget::EsNext] {
            let files = lib_files(target);
            let root = format!("/{}", target.root_lib());
            assert!(files.contains_key(&root), "missing {root}");
            assert!(files.contains_key("/lib.es5.d.ts"));
        }
    }

    #[test]
    fn test_host_libraries_are_present_before_stripping() {
        let files = lib_files(LibTarget::Es2022);
        assert!(files.contains_key("/lib.dom.d.ts"));
        assert!(files.contains_key("/lib.webworker.d.ts"));
        assert!(files.contains_key("/lib.scripthost.d.ts"));
        assert!(files.contains_key("/lib.es2022.full.d.ts"));
    }

    #[test]
    fn test_stubs_parse_without_errors() {
        for (path, content) in lib_files(LibTarget::EsNext) {
            let tree = crate::parser_pool::parse(&content).unwrap();
            assert!(!tree.root_node().has_error(), "{path} has syntax errors");
        }
    }
}
