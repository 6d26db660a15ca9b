//! Opcode tables: operators, intrinsics, swizzles, qualifier kinds and
//! control-flow markers.

use crate::types::PrimitiveType;

code_enum! {
    /// Binary and unary operators.
    pub enum OperationCode {
        Addition => "addition",
        Subtraction => "subtraction",
        Multiplication => "multiplication",
        Division => "division",
        Modulus => "modulus",
        BitAnd => "bit_and",
        BitOr => "bit_or",
        BitXor => "bit_xor",
        BitShiftLeft => "bit_shift_left",
        BitShiftRight => "bit_shift_right",
        LogicalAnd => "logical_and",
        LogicalOr => "logical_or",
        Equals => "equals",
        NotEquals => "not_equals",
        Less => "less",
        LessEqual => "less_equal",
        Greater => "greater",
        GreaterEqual => "greater_equal",
        Negation => "negation",
        LogicalNot => "logical_not",
        BitNot => "bit_not",
    }
}

impl OperationCode {
    /// Infix or prefix symbol shared by GLSL and C++.
    pub fn symbol(self) -> &'static str {
        use OperationCode as O;
        match self {
            O::Addition => "+",
            O::Subtraction | O::Negation => "-",
            O::Multiplication => "*",
            O::Division => "/",
            O::Modulus => "%",
            O::BitAnd => "&",
            O::BitOr => "|",
            O::BitXor => "^",
            O::BitShiftLeft => "<<",
            O::BitShiftRight => ">>",
            O::LogicalAnd => "&&",
            O::LogicalOr => "||",
            O::Equals => "==",
            O::NotEquals => "!=",
            O::Less => "<",
            O::LessEqual => "<=",
            O::Greater => ">",
            O::GreaterEqual => ">=",
            O::LogicalNot => "!",
            O::BitNot => "~",
        }
    }

    pub fn is_unary(self) -> bool {
        matches!(
            self,
            OperationCode::Negation | OperationCode::LogicalNot | OperationCode::BitNot
        )
    }
}

code_enum! {
    /// Built-in functions.
    pub enum IntrinsicCode {
        Abs => "abs",
        Sign => "sign",
        Floor => "floor",
        Ceil => "ceil",
        Fract => "fract",
        Sqrt => "sqrt",
        InverseSqrt => "inversesqrt",
        Exp => "exp",
        Log => "log",
        Exp2 => "exp2",
        Log2 => "log2",
        Sin => "sin",
        Cos => "cos",
        Tan => "tan",
        Asin => "asin",
        Acos => "acos",
        Atan => "atan",
        Pow => "pow",
        Min => "min",
        Max => "max",
        Clamp => "clamp",
        Mix => "mix",
        Step => "step",
        Smoothstep => "smoothstep",
        Mod => "mod",
        Dot => "dot",
        Cross => "cross",
        Length => "length",
        Distance => "distance",
        Normalize => "normalize",
        Reflect => "reflect",
        Transpose => "transpose",
        Inverse => "inverse",
        Determinant => "determinant",
        Dfdx => "dfdx",
        Dfdy => "dfdy",
        Fwidth => "fwidth",
        Texture => "texture",
        TextureLod => "texture_lod",
        TexelFetch => "texel_fetch",
        TextureSize => "texture_size",
        ImageLoad => "image_load",
        ImageStore => "image_store",
        ImageSize => "image_size",
        Discard => "discard",
        Barrier => "barrier",
        MemoryBarrier => "memory_barrier",
        EmitMeshTasks => "emit_mesh_tasks",
        SetMeshOutputs => "set_mesh_outputs",
        SubgroupBarrier => "subgroup_barrier",
        SubgroupElect => "subgroup_elect",
        SubgroupAdd => "subgroup_add",
        SubgroupBroadcastFirst => "subgroup_broadcast_first",
        AtomicAdd => "atomic_add",
        TraceRay => "trace_ray",
        TerminateRay => "terminate_ray",
        IgnoreIntersection => "ignore_intersection",
        LayoutLocalSize => "layout_local_size",
        LayoutMeshShaderSizes => "layout_mesh_shader_sizes",
    }
}

impl IntrinsicCode {
    /// Name of the GLSL built-in (or statement keyword).
    pub fn glsl_name(self) -> &'static str {
        use IntrinsicCode as I;
        match self {
            I::Dfdx => "dFdx",
            I::Dfdy => "dFdy",
            I::TextureLod => "textureLod",
            I::TexelFetch => "texelFetch",
            I::TextureSize => "textureSize",
            I::ImageLoad => "imageLoad",
            I::ImageStore => "imageStore",
            I::ImageSize => "imageSize",
            I::MemoryBarrier => "memoryBarrier",
            I::EmitMeshTasks => "EmitMeshTasksEXT",
            I::SetMeshOutputs => "SetMeshOutputsEXT",
            I::SubgroupBarrier => "subgroupBarrier",
            I::SubgroupElect => "subgroupElect",
            I::SubgroupAdd => "subgroupAdd",
            I::SubgroupBroadcastFirst => "subgroupBroadcastFirst",
            I::AtomicAdd => "atomicAdd",
            I::TraceRay => "traceRayEXT",
            I::TerminateRay => "terminateRayEXT",
            I::IgnoreIntersection => "ignoreIntersectionEXT",
            other => other.name(),
        }
    }

    /// Intrinsics that must execute even when their result is unused.
    pub fn is_side_effect(self) -> bool {
        use IntrinsicCode as I;
        matches!(
            self,
            I::Discard
                | I::Barrier
                | I::MemoryBarrier
                | I::EmitMeshTasks
                | I::SetMeshOutputs
                | I::SubgroupBarrier
                | I::SubgroupElect
                | I::SubgroupAdd
                | I::SubgroupBroadcastFirst
                | I::AtomicAdd
                | I::ImageStore
                | I::TraceRay
                | I::TerminateRay
                | I::IgnoreIntersection
        )
    }

    /// Intrinsics that only configure the unit and emit no statement.
    pub fn is_layout(self) -> bool {
        matches!(
            self,
            IntrinsicCode::LayoutLocalSize | IntrinsicCode::LayoutMeshShaderSizes
        )
    }

    /// Intrinsics written as a bare keyword statement in GLSL.
    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            IntrinsicCode::Discard | IntrinsicCode::TerminateRay | IntrinsicCode::IgnoreIntersection
        )
    }

    /// Intrinsics whose first argument is an image, sampler or
    /// acceleration structure and which resolve by dimension rather than
    /// through the overload tables.
    pub fn is_resource_access(self) -> bool {
        use IntrinsicCode as I;
        matches!(
            self,
            I::Texture
                | I::TextureLod
                | I::TexelFetch
                | I::TextureSize
                | I::ImageLoad
                | I::ImageStore
                | I::ImageSize
                | I::TraceRay
        )
    }
}

code_enum! {
    /// Vector component selections.
    pub enum SwizzleCode {
        X => "x",
        Y => "y",
        Z => "z",
        W => "w",
        XY => "xy",
        YZ => "yz",
        ZW => "zw",
        XZ => "xz",
        XW => "xw",
        YW => "yw",
        XYZ => "xyz",
        YZW => "yzw",
        XYZW => "xyzw",
    }
}

impl SwizzleCode {
    /// Selected component positions.
    pub fn components(self) -> &'static [usize] {
        use SwizzleCode as S;
        match self {
            S::X => &[0],
            S::Y => &[1],
            S::Z => &[2],
            S::W => &[3],
            S::XY => &[0, 1],
            S::YZ => &[1, 2],
            S::ZW => &[2, 3],
            S::XZ => &[0, 2],
            S::XW => &[0, 3],
            S::YW => &[1, 3],
            S::XYZ => &[0, 1, 2],
            S::YZW => &[1, 2, 3],
            S::XYZW => &[0, 1, 2, 3],
        }
    }

    /// Highest component position read.
    pub fn max_component(self) -> usize {
        self.components().iter().copied().max().unwrap_or(0)
    }
}

code_enum! {
    /// What a `Qualifier` atom names.
    pub enum QualifierKind {
        Parameter => "parameter",
        LayoutInFlat => "layout_in_flat",
        LayoutInSmooth => "layout_in_smooth",
        LayoutInNoPerspective => "layout_in_noperspective",
        LayoutOutFlat => "layout_out_flat",
        LayoutOutSmooth => "layout_out_smooth",
        LayoutOutNoPerspective => "layout_out_noperspective",
        PushConstant => "push_constant",
        UniformBuffer => "uniform_buffer",
        StorageBuffer => "storage_buffer",
        ReadOnly => "read_only",
        WriteOnly => "write_only",
        ScalarLayout => "scalar_layout",
        BufferReference => "buffer_reference",
        Shared => "shared",
        Arrays => "arrays",
        InArg => "in_arg",
        OutArg => "out_arg",
        InOutArg => "inout_arg",
        Image1D => "image1d",
        Image2D => "image2d",
        Image3D => "image3d",
        IImage1D => "iimage1d",
        IImage2D => "iimage2d",
        IImage3D => "iimage3d",
        UImage1D => "uimage1d",
        UImage2D => "uimage2d",
        UImage3D => "uimage3d",
        Sampler1D => "sampler1d",
        Sampler2D => "sampler2d",
        Sampler3D => "sampler3d",
        ISampler1D => "isampler1d",
        ISampler2D => "isampler2d",
        ISampler3D => "isampler3d",
        USampler1D => "usampler1d",
        USampler2D => "usampler2d",
        USampler3D => "usampler3d",
        FormatRgba32f => "format_rgba32f",
        FormatRgba16f => "format_rgba16f",
        FormatRg32f => "format_rg32f",
        FormatR32f => "format_r32f",
        FormatRgba8 => "format_rgba8",
        FormatR32i => "format_r32i",
        FormatR32ui => "format_r32ui",
        TaskPayload => "task_payload",
        HitAttribute => "hit_attribute",
        AccelerationStructure => "acceleration_structure",
        RayPayload => "ray_payload",
        RayPayloadIn => "ray_payload_in",
        GlPosition => "gl_Position",
        GlVertexIndex => "gl_VertexIndex",
        GlInstanceIndex => "gl_InstanceIndex",
        GlFragCoord => "gl_FragCoord",
        GlFragDepth => "gl_FragDepth",
        GlGlobalInvocationId => "gl_GlobalInvocationID",
        GlLocalInvocationId => "gl_LocalInvocationID",
        GlLocalInvocationIndex => "gl_LocalInvocationIndex",
        GlWorkGroupId => "gl_WorkGroupID",
        GlLaunchIdExt => "gl_LaunchIDEXT",
        GlLaunchSizeExt => "gl_LaunchSizeEXT",
    }
}

/// Interpolation of a layout input or output.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Interpolation {
    Flat,
    Smooth,
    NoPerspective,
}

impl Interpolation {
    /// GLSL qualifier prefix, including the trailing space.
    pub fn glsl(self) -> &'static str {
        match self {
            Interpolation::Flat => "flat ",
            Interpolation::Smooth => "",
            Interpolation::NoPerspective => "noperspective ",
        }
    }
}

impl QualifierKind {
    /// `(result, dimension)` of an image kind.
    pub fn image_info(self) -> Option<(PrimitiveType, u8)> {
        use PrimitiveType as P;
        use QualifierKind as Q;
        Some(match self {
            Q::Image1D => (P::Vec4, 1),
            Q::Image2D => (P::Vec4, 2),
            Q::Image3D => (P::Vec4, 3),
            Q::IImage1D => (P::IVec4, 1),
            Q::IImage2D => (P::IVec4, 2),
            Q::IImage3D => (P::IVec4, 3),
            Q::UImage1D => (P::UVec4, 1),
            Q::UImage2D => (P::UVec4, 2),
            Q::UImage3D => (P::UVec4, 3),
            _ => return None,
        })
    }

    /// `(result, dimension)` of a sampler kind.
    pub fn sampler_info(self) -> Option<(PrimitiveType, u8)> {
        use PrimitiveType as P;
        use QualifierKind as Q;
        Some(match self {
            Q::Sampler1D => (P::Vec4, 1),
            Q::Sampler2D => (P::Vec4, 2),
            Q::Sampler3D => (P::Vec4, 3),
            Q::ISampler1D => (P::IVec4, 1),
            Q::ISampler2D => (P::IVec4, 2),
            Q::ISampler3D => (P::IVec4, 3),
            Q::USampler1D => (P::UVec4, 1),
            Q::USampler2D => (P::UVec4, 2),
            Q::USampler3D => (P::UVec4, 3),
            _ => return None,
        })
    }

    /// Built-in variable: GLSL name and fixed type.
    pub fn builtin(self) -> Option<(&'static str, PrimitiveType)> {
        use PrimitiveType as P;
        use QualifierKind as Q;
        let ty = match self {
            Q::GlPosition | Q::GlFragCoord => P::Vec4,
            Q::GlVertexIndex | Q::GlInstanceIndex => P::I32,
            Q::GlFragDepth => P::F32,
            Q::GlLocalInvocationIndex => P::U32,
            Q::GlGlobalInvocationId
            | Q::GlLocalInvocationId
            | Q::GlWorkGroupId
            | Q::GlLaunchIdExt
            | Q::GlLaunchSizeExt => P::UVec3,
            _ => return None,
        };
        Some((self.name(), ty))
    }

    /// Layout input interpolation.
    pub fn layout_in(self) -> Option<Interpolation> {
        match self {
            QualifierKind::LayoutInFlat => Some(Interpolation::Flat),
            QualifierKind::LayoutInSmooth => Some(Interpolation::Smooth),
            QualifierKind::LayoutInNoPerspective => Some(Interpolation::NoPerspective),
            _ => None,
        }
    }

    /// Layout output interpolation.
    pub fn layout_out(self) -> Option<Interpolation> {
        match self {
            QualifierKind::LayoutOutFlat => Some(Interpolation::Flat),
            QualifierKind::LayoutOutSmooth => Some(Interpolation::Smooth),
            QualifierKind::LayoutOutNoPerspective => Some(Interpolation::NoPerspective),
            _ => None,
        }
    }

    /// Access/layout modifiers that wrap another resource qualifier.
    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            QualifierKind::ReadOnly | QualifierKind::WriteOnly | QualifierKind::ScalarLayout
        )
    }

    /// Image format layout name.
    pub fn format(self) -> Option<&'static str> {
        use QualifierKind as Q;
        Some(match self {
            Q::FormatRgba32f => "rgba32f",
            Q::FormatRgba16f => "rgba16f",
            Q::FormatRg32f => "rg32f",
            Q::FormatR32f => "r32f",
            Q::FormatRgba8 => "rgba8",
            Q::FormatR32i => "r32i",
            Q::FormatR32ui => "r32ui",
            _ => return None,
        })
    }

    pub fn is_argument(self) -> bool {
        matches!(
            self,
            QualifierKind::InArg | QualifierKind::OutArg | QualifierKind::InOutArg
        )
    }
}

code_enum! {
    /// Structured control-flow markers.
    pub enum BranchKind {
        If => "if",
        ElseIf => "elif",
        Else => "else",
        While => "while",
        For => "for",
        Continue => "continue",
        Break => "break",
        End => "end",
    }
}

impl BranchKind {
    /// Kinds that open a block closed by a later `End`.
    pub fn opens_block(self) -> bool {
        matches!(
            self,
            BranchKind::If | BranchKind::ElseIf | BranchKind::Else | BranchKind::While | BranchKind::For
        )
    }

    /// Kinds that carry a condition.
    pub fn has_condition(self) -> bool {
        matches!(
            self,
            BranchKind::If | BranchKind::ElseIf | BranchKind::While | BranchKind::For
        )
    }
}

code_enum! {
    /// How a `Construct` materializes.
    pub enum ConstructorMode {
        Normal => "normal",
        /// Type carrier only: parameter placeholders, image/sampler wrappers.
        Transient => "transient",
    }
}
