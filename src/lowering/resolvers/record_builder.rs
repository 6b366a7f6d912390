use crate::{
    ast::{Expr, ExprKind, PropertyName},
    lowering::{LoweringContext, LoweringError, MetadataKey},
};

pub struct RecordBuilder;

impl RecordBuilder {
    /// Field name an expression contributes to a record.
    pub fn field_name(expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Cast { alias, .. } => alias.clone(),
            ExprKind::Property { name: PropertyName::Const(name), .. } => name.clone(),
            ExprKind::Property { name: PropertyName::Computed(name), .. } => match &name.kind {
                ExprKind::Literal(literal) => literal.as_str().map_or_else(|| name.to_string(), str::to_string),
                _ => name.to_string(),
            },
            _ => expr.to_string(),
        }
    }

    pub fn field_names(exprs: &[Expr]) -> Vec<String> {
        exprs.iter().map(Self::field_name).collect()
    }

    /// Single unnamed projections pass through as plain values.
    pub fn needs_record(exprs: &[Expr]) -> bool {
        match exprs {
            [single] => matches!(single.kind, ExprKind::Cast { .. }),
            _ => true,
        }
    }

    /// Strips a cast-style rename, leaving the value it names.
    pub fn unwrap_value(expr: Expr) -> Expr {
        match expr.kind {
            ExprKind::Cast { expr, .. } => *expr,
            _ => expr,
        }
    }

    /// Record names are taken from the input projections, values from their rewritten form.
    /// The names are stored in the current query's metadata under `key`.
    pub fn build_record(
        originals: &[Expr],
        values: Vec<Expr>,
        key: MetadataKey,
        row: Option<Expr>,
        ctx: &mut LoweringContext,
    ) -> Result<(Expr, Vec<String>), LoweringError> {
        let names = Self::field_names(originals);
        ctx.frame_mut()?.metadata.set(key, names.clone());

        let binding = ctx.config.metadata_binding.clone();
        let record = Expr::synthetic(ExprKind::Record {
            values: values.into_iter().map(Self::unwrap_value).collect(),
            names: Box::new(key.lookup(&binding)),
            aliases: Box::new(MetadataKey::AliasNameList.lookup(&binding)),
            row: row.map(Box::new),
        });
        Ok((record, names))
    }
}
